//! Raw prediction requests and the feature vectors coerced from them

use crate::types::prediction::PredictionKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of the user owning predictions and uploads.
///
/// Assigned by the upstream authentication layer; this service never
/// creates or validates accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw form submission: field name to the string the user typed.
///
/// Kept verbatim on the stored record so the entered values can be shown
/// back to the user exactly as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionRequest {
    fields: BTreeMap<String, String>,
}

impl PredictionRequest {
    /// Create an empty request
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful in tests
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Raw value for a field, if submitted
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Borrow the underlying mapping
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl From<BTreeMap<String, String>> for PredictionRequest {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

impl From<std::collections::HashMap<String, String>> for PredictionRequest {
    fn from(fields: std::collections::HashMap<String, String>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PredictionRequest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Ordered model input, positionally aligned to the schema it was built from.
///
/// Only the feature extractor constructs these, so a vector always has
/// exactly one value per schema entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    kind: PredictionKind,
    values: Vec<f64>,
}

impl FeatureVector {
    pub(crate) fn new(kind: PredictionKind, values: Vec<f64>) -> Self {
        Self { kind, values }
    }

    /// Which schema produced this vector
    pub fn kind(&self) -> PredictionKind {
        self.kind
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Single-precision copy for ONNX input tensors
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_as_plain_map() {
        let request = PredictionRequest::new()
            .with("heart_rate", "88")
            .with("temperature", "38.2");

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"heart_rate":"88","temperature":"38.2"}"#);

        let back: PredictionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_feature_vector_to_f32() {
        let vector = FeatureVector::new(PredictionKind::Survival, vec![45.0, 1.0, 3.0]);
        assert_eq!(vector.to_f32(), vec![45.0_f32, 1.0, 3.0]);
        assert_eq!(vector.kind(), PredictionKind::Survival);
    }
}
