//! Error types for the prediction pipeline, the store and upload storage

use std::path::PathBuf;
use thiserror::Error;

/// Boxed underlying cause of a model failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that abort a prediction request.
///
/// `MissingField` and `InvalidValue` are user-correctable and safe to show
/// verbatim. The other variants carry internal detail and must only be
/// logged.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required feature is absent from the submission.
    #[error("missing required field: {field}")]
    MissingField { field: String },

    /// A feature is present but not usable.
    #[error("invalid value '{value}' for {field}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// The classifier raised while scoring the vector.
    #[error("model inference failed ({model}): {source}")]
    ModelInference {
        model: String,
        #[source]
        source: BoxError,
    },

    /// The finished record could not be written.
    #[error("failed to persist prediction: {0}")]
    Storage(#[from] StoreError),
}

impl PipelineError {
    pub fn missing(field: impl Into<String>) -> Self {
        PipelineError::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn inference(model: impl Into<String>, source: impl Into<BoxError>) -> Self {
        PipelineError::ModelInference {
            model: model.into(),
            source: source.into(),
        }
    }

    /// Whether the message can be shown to the submitter as-is
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingField { .. } | PipelineError::InvalidValue { .. }
        )
    }

    /// Short label used for metrics and log fields
    pub fn label(&self) -> &'static str {
        match self {
            PipelineError::MissingField { .. } => "missing_field",
            PipelineError::InvalidValue { .. } => "invalid_value",
            PipelineError::ModelInference { .. } => "model_inference",
            PipelineError::Storage(_) => "storage",
        }
    }
}

/// Errors raised by prediction and upload stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid database value: {0}")]
    InvalidDbValue(String),

    /// Stored upload names are unique across owners.
    #[error("upload already recorded: {0}")]
    DuplicateUpload(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Errors raised while storing or serving uploaded PDFs.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Only PDF documents are accepted.
    #[error("please choose a PDF file (got '{filename}')")]
    NotPdf { filename: String },

    /// Nothing usable remained after sanitising the file name.
    #[error("file name is empty after sanitising")]
    EmptyFilename,

    /// No upload with this name belongs to the requesting owner.
    #[error("upload not found: {filename}")]
    NotFound { filename: String },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_correctable_classification() {
        assert!(PipelineError::missing("spo2").is_user_correctable());
        assert!(PipelineError::invalid("heart_rate", "abc", "not a number").is_user_correctable());
        assert!(!PipelineError::inference("risk", "boom").is_user_correctable());
        assert!(!PipelineError::from(StoreError::Poisoned).is_user_correctable());
    }

    #[test]
    fn test_inference_error_keeps_source() {
        use std::error::Error as _;

        let err = PipelineError::inference("sepsis_risk", anyhow::anyhow!("shape mismatch"));
        assert_eq!(err.label(), "model_inference");
        assert_eq!(err.source().unwrap().to_string(), "shape mismatch");
    }

    #[test]
    fn test_messages_name_the_field() {
        let err = PipelineError::missing("age_years");
        assert_eq!(err.to_string(), "missing required field: age_years");

        let err = PipelineError::invalid("age_years", "0", "age cannot be 0 or negative");
        assert_eq!(
            err.to_string(),
            "invalid value '0' for age_years: age cannot be 0 or negative"
        );
    }
}
