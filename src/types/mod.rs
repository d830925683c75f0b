//! Type definitions for the sepsis prediction service

pub mod prediction;
pub mod request;
pub mod upload;

pub use prediction::{
    PredictionKind, PredictionRecord, PredictionResult, Severity, StoredPrediction,
    SurvivalOutcome,
};
pub use request::{FeatureVector, OwnerId, PredictionRequest};
pub use upload::{NewUpload, UploadRecord};
