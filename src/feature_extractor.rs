//! Feature schemas and coercion of raw form input into model vectors.
//!
//! The schema order is the column order the classifiers were trained on.
//! Reordering an entry here silently corrupts every prediction, so the
//! tests pin the exact sequence.

use crate::error::PipelineError;
use crate::types::prediction::PredictionKind;
use crate::types::request::{FeatureVector, PredictionRequest};
use std::ops::RangeInclusive;
use tracing::{debug, warn};

/// Domain constraint checked after a value parses as a number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldConstraint {
    /// Any finite number
    Any,
    /// Whole number greater than zero
    PositiveInteger,
}

/// One named numeric input of a schema
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDef {
    /// Canonical field name, also the training column name
    pub name: &'static str,
    /// Alternate form field names accepted for this feature
    pub aliases: &'static [&'static str],
    pub constraint: FieldConstraint,
    /// Physiologically plausible range. Values outside it are accepted but logged.
    pub plausible: Option<RangeInclusive<f64>>,
}

impl FeatureDef {
    const fn numeric(name: &'static str) -> Self {
        Self {
            name,
            aliases: &[],
            constraint: FieldConstraint::Any,
            plausible: None,
        }
    }

    const fn vital(name: &'static str, low: f64, high: f64) -> Self {
        Self {
            name,
            aliases: &[],
            constraint: FieldConstraint::Any,
            plausible: Some(low..=high),
        }
    }

    const fn with_aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    const fn with_constraint(mut self, constraint: FieldConstraint) -> Self {
        self.constraint = constraint;
        self
    }
}

static SURVIVAL_FEATURES: [FeatureDef; 3] = [
    FeatureDef::numeric("age_years")
        .with_aliases(&["age"])
        .with_constraint(FieldConstraint::PositiveInteger),
    FeatureDef::numeric("sex_0male_1female").with_aliases(&["gender"]),
    FeatureDef::numeric("episode_number").with_aliases(&["episode"]),
];

static SEPSIS_RISK_FEATURES: [FeatureDef; 11] = [
    FeatureDef::vital("temperature", 30.0, 45.0),
    FeatureDef::vital("heart_rate", 20.0, 250.0),
    FeatureDef::vital("resp_rate", 4.0, 70.0),
    FeatureDef::vital("systolic_bp", 40.0, 280.0),
    FeatureDef::vital("diastolic_bp", 20.0, 180.0),
    FeatureDef::vital("wbc", 0.0, 200.0),
    FeatureDef::vital("platelets", 0.0, 2000.0),
    FeatureDef::vital("lactate", 0.0, 30.0),
    FeatureDef::vital("creatinine", 0.0, 25.0),
    FeatureDef::vital("bilirubin", 0.0, 50.0),
    FeatureDef::vital("spo2", 50.0, 100.0),
];

/// Ordered feature list a model expects
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSchema {
    kind: PredictionKind,
    features: &'static [FeatureDef],
}

impl FeatureSchema {
    /// Age, sex and episode number, as used by the survival and severity models
    pub fn survival() -> Self {
        Self {
            kind: PredictionKind::Survival,
            features: &SURVIVAL_FEATURES,
        }
    }

    /// The eleven vitals used by the sepsis risk model
    pub fn sepsis_risk() -> Self {
        Self {
            kind: PredictionKind::SepsisRisk,
            features: &SEPSIS_RISK_FEATURES,
        }
    }

    pub fn for_kind(kind: PredictionKind) -> Self {
        match kind {
            PredictionKind::Survival => Self::survival(),
            PredictionKind::SepsisRisk => Self::sepsis_risk(),
        }
    }

    pub fn kind(&self) -> PredictionKind {
        self.kind
    }

    pub fn features(&self) -> &'static [FeatureDef] {
        self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Canonical names in vector order
    pub fn names(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.name).collect()
    }
}

/// Turns raw form submissions into feature vectors.
///
/// Stateless; one instance can serve every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Coerce `request` into a vector for `schema`.
    ///
    /// Walks the schema in order and stops at the first failing field.
    /// Keys not named by the schema are ignored.
    pub fn extract(
        &self,
        schema: &FeatureSchema,
        request: &PredictionRequest,
    ) -> Result<FeatureVector, PipelineError> {
        let mut values = Vec::with_capacity(schema.len());

        for feature in schema.features() {
            let raw = lookup(request, feature)
                .ok_or_else(|| PipelineError::missing(feature.name))?;
            let value = coerce(feature, raw)?;

            if let Some(range) = &feature.plausible {
                if !range.contains(&value) {
                    warn!(
                        field = feature.name,
                        value = value,
                        low = *range.start(),
                        high = *range.end(),
                        "Value outside plausible range, passing to model unchanged"
                    );
                }
            }

            values.push(value);
        }

        debug!(schema = %schema.kind(), features = values.len(), "Feature vector built");

        Ok(FeatureVector::new(schema.kind(), values))
    }
}

/// Canonical name first, then aliases in declaration order
fn lookup<'a>(request: &'a PredictionRequest, feature: &FeatureDef) -> Option<&'a str> {
    request
        .get(feature.name)
        .or_else(|| feature.aliases.iter().find_map(|alias| request.get(alias)))
}

fn coerce(feature: &FeatureDef, raw: &str) -> Result<f64, PipelineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::invalid(feature.name, raw, "value is empty"));
    }

    let value: f64 = trimmed
        .parse()
        .map_err(|_| PipelineError::invalid(feature.name, raw, "not a number"))?;

    if !value.is_finite() {
        return Err(PipelineError::invalid(
            feature.name,
            raw,
            "must be a finite number",
        ));
    }

    match feature.constraint {
        FieldConstraint::Any => {}
        FieldConstraint::PositiveInteger => {
            if value <= 0.0 {
                return Err(PipelineError::invalid(
                    feature.name,
                    raw,
                    "age cannot be 0 or negative",
                ));
            }
            if value.fract() != 0.0 {
                return Err(PipelineError::invalid(
                    feature.name,
                    raw,
                    "must be a whole number",
                ));
            }
        }
    }

    Ok(value)
}
