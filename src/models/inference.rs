//! Inference engine applying the survival, severity and sepsis risk models

use crate::config::ModelsConfig;
use crate::error::PipelineError;
use crate::feature_extractor::FeatureSchema;
use crate::models::labels::LabelEncoding;
use crate::models::loader::ModelLoader;
use crate::models::{ClassifierModel, ProbabilisticModel};
use crate::types::prediction::{PredictionKind, PredictionResult, SurvivalOutcome};
use crate::types::request::FeatureVector;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Holds the loaded classifiers for both prediction flows.
///
/// Built once at startup and shared read-only between requests.
pub struct InferenceEngine {
    survival: Arc<dyn ClassifierModel>,
    severity: Arc<dyn ClassifierModel>,
    severity_labels: LabelEncoding,
    risk: Arc<dyn ProbabilisticModel>,
}

impl InferenceEngine {
    /// Assemble an engine from already-constructed models
    pub fn new(
        survival: Arc<dyn ClassifierModel>,
        severity: Arc<dyn ClassifierModel>,
        severity_labels: LabelEncoding,
        risk: Arc<dyn ProbabilisticModel>,
    ) -> Self {
        Self {
            survival,
            severity,
            severity_labels,
            risk,
        }
    }

    /// Load every ONNX model and the label table named in the configuration
    pub fn from_config(config: &ModelsConfig) -> Result<Self> {
        let dir = Path::new(&config.models_dir);
        let loader = ModelLoader::with_threads(config.onnx_threads);

        let survival = loader
            .load_model(dir.join(&config.survival_model), "survival")
            .context("failed to load survival model")?;
        let severity = loader
            .load_model(dir.join(&config.severity_model), "severity")
            .context("failed to load severity model")?;
        let risk = loader
            .load_model(dir.join(&config.risk_model), "sepsis_risk")
            .context("failed to load sepsis risk model")?;
        let severity_labels = LabelEncoding::load(dir.join(&config.severity_labels))?;

        info!(
            models_dir = %dir.display(),
            severity_classes = severity_labels.len(),
            "Inference engine initialized"
        );

        Ok(Self::new(
            Arc::new(survival),
            Arc::new(severity),
            severity_labels,
            Arc::new(risk),
        ))
    }

    /// Loaded model names
    pub fn model_names(&self) -> Vec<String> {
        vec![
            self.survival.name().to_string(),
            self.severity.name().to_string(),
            self.risk.name().to_string(),
        ]
    }

    /// Run whichever flow the vector was built for
    pub fn predict(&self, features: &FeatureVector) -> Result<PredictionResult, PipelineError> {
        match features.kind() {
            PredictionKind::Survival => self.predict_survival(features),
            PredictionKind::SepsisRisk => self.predict_risk(features),
        }
    }

    /// Hospital outcome plus severity category
    pub fn predict_survival(
        &self,
        features: &FeatureVector,
    ) -> Result<PredictionResult, PipelineError> {
        check_arity(features, PredictionKind::Survival, self.survival.name())?;

        let alive_flag = self
            .survival
            .predict(features)
            .map_err(|e| PipelineError::inference(self.survival.name(), e))?;

        let severity_code = self
            .severity
            .predict(features)
            .map_err(|e| PipelineError::inference(self.severity.name(), e))?;

        let severity = self.severity_labels.decode(severity_code).ok_or_else(|| {
            PipelineError::inference(
                self.severity.name(),
                format!("severity code {severity_code} is not in the label encoding"),
            )
        })?;

        let outcome = SurvivalOutcome::from_label(alive_flag).ok_or_else(|| {
            PipelineError::inference(
                self.survival.name(),
                format!("survival label {alive_flag} is not 0 or 1"),
            )
        })?;

        debug!(
            outcome = outcome.as_str(),
            severity = %severity,
            "Survival inference complete"
        );

        Ok(PredictionResult::Survival { outcome, severity })
    }

    /// Sepsis flag plus positive-class probability
    pub fn predict_risk(
        &self,
        features: &FeatureVector,
    ) -> Result<PredictionResult, PipelineError> {
        check_arity(features, PredictionKind::SepsisRisk, self.risk.name())?;

        let label = self
            .risk
            .predict(features)
            .map_err(|e| PipelineError::inference(self.risk.name(), e))?;

        let probability = self
            .risk
            .predict_probability(features)
            .map_err(|e| PipelineError::inference(self.risk.name(), e))?;

        if !(0.0..=1.0).contains(&probability) {
            return Err(PipelineError::inference(
                self.risk.name(),
                format!("probability {probability} outside [0, 1]"),
            ));
        }

        debug!(
            label = label,
            probability = probability,
            "Sepsis risk inference complete"
        );

        Ok(PredictionResult::SepsisRisk {
            is_sepsis: label == 1,
            probability,
        })
    }
}

fn check_arity(
    features: &FeatureVector,
    expected: PredictionKind,
    model: &str,
) -> Result<(), PipelineError> {
    let width = FeatureSchema::for_kind(expected).len();
    if features.kind() != expected || features.len() != width {
        return Err(PipelineError::inference(
            model,
            format!(
                "expected {} vector of width {}, got {} vector of width {}",
                expected,
                width,
                features.kind(),
                features.len()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FeatureExtractor;
    use crate::types::prediction::Severity;
    use crate::types::request::PredictionRequest;

    struct Fixed {
        name: &'static str,
        label: i64,
        probability: f64,
    }

    impl ClassifierModel for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn predict(&self, _: &FeatureVector) -> anyhow::Result<i64> {
            Ok(self.label)
        }
    }

    impl ProbabilisticModel for Fixed {
        fn predict_probability(&self, _: &FeatureVector) -> anyhow::Result<f64> {
            Ok(self.probability)
        }
    }

    struct Failing;

    impl ClassifierModel for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn predict(&self, _: &FeatureVector) -> anyhow::Result<i64> {
            anyhow::bail!("input rank mismatch")
        }
    }

    fn fixed(name: &'static str, label: i64, probability: f64) -> Arc<Fixed> {
        Arc::new(Fixed {
            name,
            label,
            probability,
        })
    }

    fn engine(risk_probability: f64) -> InferenceEngine {
        InferenceEngine::new(
            fixed("survival", 1, 0.0),
            fixed("severity", 2, 0.0),
            LabelEncoding::default(),
            fixed("sepsis_risk", 1, risk_probability),
        )
    }

    fn survival_vector() -> FeatureVector {
        let request = PredictionRequest::new()
            .with("age_years", "45")
            .with("sex_0male_1female", "1")
            .with("episode_number", "3");
        FeatureExtractor::new()
            .extract(&FeatureSchema::survival(), &request)
            .unwrap()
    }

    fn risk_vector() -> FeatureVector {
        let request: PredictionRequest = FeatureSchema::sepsis_risk()
            .names()
            .into_iter()
            .map(|name| (name, "1"))
            .collect();
        FeatureExtractor::new()
            .extract(&FeatureSchema::sepsis_risk(), &request)
            .unwrap()
    }

    #[test]
    fn test_survival_decodes_severity() {
        let result = engine(0.5).predict(&survival_vector()).unwrap();
        assert_eq!(
            result,
            PredictionResult::Survival {
                outcome: SurvivalOutcome::Alive,
                severity: Severity::Medium,
            }
        );
    }

    #[test]
    fn test_risk_reports_probability() {
        let result = engine(0.82).predict(&risk_vector()).unwrap();
        assert_eq!(
            result,
            PredictionResult::SepsisRisk {
                is_sepsis: true,
                probability: 0.82,
            }
        );
    }

    #[test]
    fn test_unknown_severity_code() {
        let engine = InferenceEngine::new(
            fixed("survival", 0, 0.0),
            fixed("severity", 9, 0.0),
            LabelEncoding::default(),
            fixed("sepsis_risk", 0, 0.1),
        );
        let err = engine.predict(&survival_vector()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ModelInference { ref model, .. } if model == "severity"
        ));
    }

    #[test]
    fn test_non_binary_survival_label() {
        for label in [2, -1] {
            let engine = InferenceEngine::new(
                fixed("survival", label, 0.0),
                fixed("severity", 1, 0.0),
                LabelEncoding::default(),
                fixed("sepsis_risk", 0, 0.1),
            );
            let err = engine.predict(&survival_vector()).unwrap_err();
            assert!(matches!(
                err,
                PipelineError::ModelInference { ref model, .. } if model == "survival"
            ));
        }
    }

    #[test]
    fn test_probability_out_of_range() {
        let err = engine(1.7).predict(&risk_vector()).unwrap_err();
        assert_eq!(err.label(), "model_inference");
    }

    #[test]
    fn test_model_error_propagates() {
        let engine = InferenceEngine::new(
            Arc::new(Failing),
            fixed("severity", 1, 0.0),
            LabelEncoding::default(),
            fixed("sepsis_risk", 0, 0.1),
        );

        match engine.predict(&survival_vector()).unwrap_err() {
            PipelineError::ModelInference { model, source } => {
                assert_eq!(model, "failing");
                assert_eq!(source.to_string(), "input rank mismatch");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_vector_kind_rejected() {
        let err = engine(0.5).predict_risk(&survival_vector()).unwrap_err();
        assert_eq!(err.label(), "model_inference");
    }

    #[test]
    fn test_model_names() {
        assert_eq!(
            engine(0.5).model_names(),
            vec!["survival", "severity", "sepsis_risk"]
        );
    }
}
