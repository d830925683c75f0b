//! Prediction pipeline: coercion, inference and record hand-off.
//!
//! Every request either produces exactly one stored record or fails
//! without touching the store.

use crate::error::PipelineError;
use crate::feature_extractor::{FeatureExtractor, FeatureSchema};
use crate::metrics::PipelineMetrics;
use crate::models::inference::InferenceEngine;
use crate::store::PredictionStore;
use crate::types::prediction::{
    PredictionKind, PredictionRecord, PredictionResult, StoredPrediction,
};
use crate::types::request::{OwnerId, PredictionRequest};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

pub struct PredictionPipeline {
    extractor: FeatureExtractor,
    engine: Arc<InferenceEngine>,
    store: Arc<dyn PredictionStore>,
    metrics: Arc<PipelineMetrics>,
}

impl PredictionPipeline {
    pub fn new(
        engine: Arc<InferenceEngine>,
        store: Arc<dyn PredictionStore>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            engine,
            store,
            metrics,
        }
    }

    /// Names of the loaded models
    pub fn model_names(&self) -> Vec<String> {
        self.engine.model_names()
    }

    /// Validate and score a request without persisting anything
    pub fn evaluate(
        &self,
        kind: PredictionKind,
        request: &PredictionRequest,
    ) -> Result<PredictionResult, PipelineError> {
        let schema = FeatureSchema::for_kind(kind);
        let features = self.extractor.extract(&schema, request)?;
        self.engine.predict(&features)
    }

    /// Pair a result with its raw input, owner and the current time
    pub fn build_record(
        owner: OwnerId,
        result: PredictionResult,
        request: PredictionRequest,
    ) -> PredictionRecord {
        PredictionRecord::new(owner, result, request)
    }

    /// Full flow: validate, score, build the record and store it
    pub fn submit(
        &self,
        owner: OwnerId,
        kind: PredictionKind,
        request: PredictionRequest,
    ) -> Result<StoredPrediction, PipelineError> {
        let started = Instant::now();

        let outcome = self.evaluate(kind, &request).and_then(|result| {
            let record = Self::build_record(owner, result, request);
            let id = self.store.insert_prediction(&record)?;
            Ok(StoredPrediction { id, record })
        });

        match &outcome {
            Ok(stored) => {
                let elapsed = started.elapsed();
                self.metrics
                    .record_prediction(kind, elapsed, stored.record.probability());
                info!(
                    owner = %owner,
                    kind = %kind,
                    id = stored.id,
                    processing_time_us = elapsed.as_micros() as u64,
                    "Prediction stored"
                );
            }
            Err(e) if e.is_user_correctable() => {
                self.metrics.record_rejection(e.label());
                warn!(owner = %owner, kind = %kind, error = %e, "Prediction request rejected");
            }
            Err(e) => {
                self.metrics.record_failure(e.label());
                error!(owner = %owner, kind = %kind, error = %e, "Prediction failed");
            }
        }

        outcome
    }

    pub fn predict_survival(
        &self,
        owner: OwnerId,
        request: PredictionRequest,
    ) -> Result<StoredPrediction, PipelineError> {
        self.submit(owner, PredictionKind::Survival, request)
    }

    pub fn predict_sepsis_risk(
        &self,
        owner: OwnerId,
        request: PredictionRequest,
    ) -> Result<StoredPrediction, PipelineError> {
        self.submit(owner, PredictionKind::SepsisRisk, request)
    }

    /// Owner's history for one flow, newest first
    pub fn history(
        &self,
        owner: OwnerId,
        kind: PredictionKind,
        limit: Option<usize>,
    ) -> Result<Vec<StoredPrediction>, PipelineError> {
        self.store.predictions(owner, kind, limit).map_err(|e| {
            self.metrics.record_failure("storage");
            error!(owner = %owner, kind = %kind, error = %e, "History query failed");
            PipelineError::from(e)
        })
    }
}
