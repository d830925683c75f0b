//! ONNX model loader and the classifier adapter wrapping an ONNX session

use crate::models::{ClassifierModel, ProbabilisticModel};
use crate::types::request::FeatureVector;
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Classifier exported from scikit-learn to ONNX.
///
/// skl2onnx exports expose an int64 `label` output and a `probabilities`
/// output, either a `[batch, n_classes]` float tensor or, with zipmap
/// enabled, a `seq(map(int64, float))`. Both layouts are handled.
pub struct OnnxClassifier {
    name: String,
    /// Running a session needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    label_output: String,
    probability_output: Option<String>,
}

impl OnnxClassifier {
    fn with_outputs<T>(
        &self,
        features: &FeatureVector,
        extract: impl FnOnce(&SessionOutputs) -> Result<T>,
    ) -> Result<T> {
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_f32()))
            .context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;
        extract(&outputs)
    }

    fn extract_label(&self, outputs: &SessionOutputs) -> Result<i64> {
        let output = outputs
            .get(self.label_output.as_str())
            .with_context(|| {
                format!(
                    "model {} produced no '{}' output",
                    self.name, self.label_output
                )
            })?;

        let (_, data) = output
            .try_extract_tensor::<i64>()
            .context("label output is not an int64 tensor")?;

        let label = data
            .first()
            .copied()
            .context("label output is empty")?;

        debug!(model = %self.name, label = label, "Extracted label");
        Ok(label)
    }

    fn extract_probability(&self, outputs: &SessionOutputs) -> Result<f64> {
        let output_name = self
            .probability_output
            .as_deref()
            .with_context(|| format!("model {} has no probability output", self.name))?;

        let output = outputs
            .get(output_name)
            .with_context(|| format!("model {} produced no '{}' output", self.name, output_name))?;

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            let prob = positive_class_from_tensor(&dims, data)?;
            debug!(model = %self.name, prob = prob, "Extracted from tensor");
            return Ok(prob);
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return self.extract_from_sequence_map(output);
        }

        anyhow::bail!(
            "model {}: unsupported probability output type {:?}",
            self.name,
            output.dtype()
        )
    }

    /// Positive-class probability from a zipmap `seq(map(int64, float))` output
    fn extract_from_sequence_map(&self, output: &DynValue) -> Result<f64> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;

        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
        let map_value = maps
            .first()
            .ok_or_else(|| anyhow::anyhow!("Empty sequence"))?;

        let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;

        if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 1) {
            debug!(model = %self.name, prob = *prob, "Extracted from seq(map)");
            return Ok(*prob as f64);
        }
        if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 0) {
            return Ok(1.0 - *prob as f64);
        }

        Err(anyhow::anyhow!("No probability found in map"))
    }
}

/// Class-1 probability from a `[1, n]` or `[n]` tensor
fn positive_class_from_tensor(dims: &[i64], data: &[f32]) -> Result<f64> {
    let classes = match dims {
        [_, n] | [n] => *n,
        _ => anyhow::bail!("unexpected probability shape {:?}", dims),
    };

    match classes {
        n if n >= 2 => data
            .get(1)
            .map(|&p| p as f64)
            .ok_or_else(|| anyhow::anyhow!("probability tensor shorter than its shape")),
        1 => data
            .first()
            .map(|&p| p as f64)
            .ok_or_else(|| anyhow::anyhow!("probability tensor is empty")),
        _ => anyhow::bail!("probability tensor has no classes"),
    }
}

impl ClassifierModel for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &FeatureVector) -> Result<i64> {
        self.with_outputs(features, |outputs| self.extract_label(outputs))
    }
}

impl ProbabilisticModel for OnnxClassifier {
    fn predict_probability(&self, features: &FeatureVector) -> Result<f64> {
        self.with_outputs(features, |outputs| self.extract_probability(outputs))
    }
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load a single ONNX classifier from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<OnnxClassifier> {
        let path = path.as_ref();

        if !path.exists() {
            anyhow::bail!("model file {} not found", path.display());
        }

        info!(
            model = %name,
            path = %path.display(),
            threads = self.onnx_threads,
            "Loading ONNX model"
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "label".to_string());

        let probability_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.iter().find(|o| o.name != label_output))
            .map(|o| o.name.clone());

        info!(
            model = %name,
            input = %input_name,
            label = %label_output,
            probabilities = ?probability_output,
            "Model loaded successfully"
        );

        Ok(OnnxClassifier {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            label_output,
            probability_output,
        })
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}
