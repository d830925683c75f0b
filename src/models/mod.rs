//! Model capabilities, ONNX adapters and the inference engine

pub mod inference;
pub mod labels;
pub mod loader;

pub use inference::InferenceEngine;
pub use labels::LabelEncoding;
pub use loader::{ModelLoader, OnnxClassifier};

use crate::types::request::FeatureVector;

/// A pre-trained classifier that maps a feature vector to a class label.
///
/// Implementations must be deterministic and free of observable side
/// effects; the pipeline calls them once per request and never retries.
pub trait ClassifierModel: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Predicted class label for one vector
    fn predict(&self, features: &FeatureVector) -> anyhow::Result<i64>;
}

/// A classifier that also reports the positive-class probability.
pub trait ProbabilisticModel: ClassifierModel {
    /// Probability of class 1, expected in [0, 1]
    fn predict_probability(&self, features: &FeatureVector) -> anyhow::Result<f64>;
}
