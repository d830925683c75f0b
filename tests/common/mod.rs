#![allow(dead_code)]

use sepsis_prediction_service::models::{ClassifierModel, LabelEncoding, ProbabilisticModel};
use sepsis_prediction_service::types::{
    FeatureVector, NewUpload, OwnerId, StoredPrediction, UploadRecord,
};
use sepsis_prediction_service::{
    InferenceEngine, PredictionKind, PredictionRecord, PredictionRequest, PredictionStore,
    StoreError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Deterministic classifier returning fixed outputs and counting calls
pub struct StubModel {
    name: &'static str,
    label: i64,
    probability: f64,
    calls: AtomicUsize,
}

impl StubModel {
    pub fn new(name: &'static str, label: i64, probability: f64) -> Arc<Self> {
        Arc::new(Self {
            name,
            label,
            probability,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClassifierModel for StubModel {
    fn name(&self) -> &str {
        self.name
    }

    fn predict(&self, _features: &FeatureVector) -> anyhow::Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.label)
    }
}

impl ProbabilisticModel for StubModel {
    fn predict_probability(&self, _features: &FeatureVector) -> anyhow::Result<f64> {
        Ok(self.probability)
    }
}

/// Classifier whose runtime always fails
pub struct BrokenModel;

impl ClassifierModel for BrokenModel {
    fn name(&self) -> &str {
        "sepsis_risk"
    }

    fn predict(&self, _features: &FeatureVector) -> anyhow::Result<i64> {
        anyhow::bail!("onnxruntime: invalid input shape")
    }
}

impl ProbabilisticModel for BrokenModel {
    fn predict_probability(&self, _features: &FeatureVector) -> anyhow::Result<f64> {
        anyhow::bail!("onnxruntime: invalid input shape")
    }
}

/// Survival: Alive, severity code 2 (Medium); risk: sepsis with the given probability
pub fn engine_with_risk(risk: Arc<dyn ProbabilisticModel>) -> Arc<InferenceEngine> {
    Arc::new(InferenceEngine::new(
        StubModel::new("survival", 1, 0.0),
        StubModel::new("severity", 2, 0.0),
        LabelEncoding::default(),
        risk,
    ))
}

pub fn engine(risk_probability: f64) -> Arc<InferenceEngine> {
    engine_with_risk(StubModel::new("sepsis_risk", 1, risk_probability))
}

pub fn survival_request() -> PredictionRequest {
    PredictionRequest::new()
        .with("age_years", "45")
        .with("sex_0male_1female", "1")
        .with("episode_number", "3")
}

pub fn sepsis_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("temperature", "38.9"),
        ("heart_rate", "118"),
        ("resp_rate", "24"),
        ("systolic_bp", "92"),
        ("diastolic_bp", "58"),
        ("wbc", "15.2"),
        ("platelets", "140"),
        ("lactate", "3.1"),
        ("creatinine", "1.6"),
        ("bilirubin", "1.2"),
        ("spo2", "93"),
    ]
}

pub fn sepsis_request() -> PredictionRequest {
    sepsis_fields().into_iter().collect()
}

/// Store whose every operation fails as if the database were corrupt
pub struct BrokenStore;

fn corrupted() -> StoreError {
    StoreError::InvalidDbValue("disk corrupted".to_string())
}

impl PredictionStore for BrokenStore {
    fn insert_prediction(&self, _record: &PredictionRecord) -> Result<i64, StoreError> {
        Err(corrupted())
    }

    fn predictions(
        &self,
        _owner: OwnerId,
        _kind: PredictionKind,
        _limit: Option<usize>,
    ) -> Result<Vec<StoredPrediction>, StoreError> {
        Err(corrupted())
    }

    fn insert_upload(&self, _upload: &NewUpload) -> Result<UploadRecord, StoreError> {
        Err(corrupted())
    }

    fn uploads(
        &self,
        _owner: OwnerId,
        _limit: Option<usize>,
    ) -> Result<Vec<UploadRecord>, StoreError> {
        Err(corrupted())
    }

    fn find_upload(
        &self,
        _owner: OwnerId,
        _filename: &str,
    ) -> Result<Option<UploadRecord>, StoreError> {
        Err(corrupted())
    }
}

/// In-memory sink for `tracing_subscriber::fmt` output
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with a subscriber recording every event into the returned buffer
pub fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs.contents())
}
