//! Severity label-encoding table produced alongside the severity model

use crate::types::prediction::Severity;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct LabelFile {
    classes: Vec<String>,
}

/// Maps encoded class integers back to severity categories.
///
/// Index `i` holds the category the encoder assigned code `i`, the same
/// layout as a fitted scikit-learn `LabelEncoder.classes_`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoding {
    classes: Vec<Severity>,
}

impl LabelEncoding {
    pub fn new(classes: Vec<Severity>) -> Self {
        Self { classes }
    }

    /// Load `{"classes": ["High", "Low", "Medium"]}` from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label encoding {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid label encoding {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let file: LabelFile = serde_json::from_str(text)?;
        if file.classes.is_empty() {
            anyhow::bail!("label encoding has no classes");
        }

        let classes = file
            .classes
            .iter()
            .map(|c| c.parse::<Severity>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { classes })
    }

    /// Category for an encoded label, if the code is in range
    pub fn decode(&self, code: i64) -> Option<Severity> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.classes.get(i))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for LabelEncoding {
    /// Alphabetical class order, as `LabelEncoder` assigns it
    fn default() -> Self {
        Self::new(vec![Severity::High, Severity::Low, Severity::Medium])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_alphabetical() {
        let enc = LabelEncoding::default();
        assert_eq!(enc.decode(0), Some(Severity::High));
        assert_eq!(enc.decode(1), Some(Severity::Low));
        assert_eq!(enc.decode(2), Some(Severity::Medium));
    }

    #[test]
    fn test_out_of_range_codes() {
        let enc = LabelEncoding::default();
        assert_eq!(enc.decode(3), None);
        assert_eq!(enc.decode(-1), None);
    }

    #[test]
    fn test_from_json() {
        let enc = LabelEncoding::from_json(r#"{"classes": ["Low", "Medium", "High"]}"#).unwrap();
        assert_eq!(enc.len(), 3);
        assert_eq!(enc.decode(2), Some(Severity::High));
    }

    #[test]
    fn test_from_json_rejects_unknown_category() {
        assert!(LabelEncoding::from_json(r#"{"classes": ["Low", "Critical"]}"#).is_err());
        assert!(LabelEncoding::from_json(r#"{"classes": []}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("severity_labels.json");
        std::fs::write(&path, r#"{"classes": ["High", "Low", "Medium"]}"#).unwrap();

        assert_eq!(LabelEncoding::load(&path).unwrap(), LabelEncoding::default());
    }
}
