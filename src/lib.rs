//! Sepsis Prediction Service Library
//!
//! Validates clinical vitals submitted as form fields, scores them with
//! pre-trained sepsis-risk and survival classifiers, and keeps an
//! owner-scoped history of every prediction.

pub mod config;
pub mod context;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod types;
pub mod uploads;

pub use config::AppConfig;
pub use context::AppContext;
pub use error::{PipelineError, StoreError, UploadError};
pub use feature_extractor::{FeatureExtractor, FeatureSchema};
pub use models::inference::InferenceEngine;
pub use pipeline::PredictionPipeline;
pub use store::{MemoryStore, PredictionStore, SqliteStore};
pub use types::{PredictionKind, PredictionRecord, PredictionRequest, PredictionResult};
