//! In-memory store

use super::{PredictionStore, Result};
use crate::error::StoreError;
use crate::types::prediction::{PredictionKind, PredictionRecord, StoredPrediction};
use crate::types::request::OwnerId;
use crate::types::upload::{NewUpload, UploadRecord};
use chrono::{DateTime, Utc};
use std::sync::RwLock;

#[derive(Default)]
struct Tables {
    next_id: i64,
    predictions: Vec<StoredPrediction>,
    uploads: Vec<UploadRecord>,
}

impl Tables {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store backed by process memory; contents vanish on restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total predictions held, across owners and kinds
    pub fn prediction_count(&self) -> usize {
        self.tables
            .read()
            .map(|t| t.predictions.len())
            .unwrap_or(0)
    }
}

fn newest_first<T>(
    mut rows: Vec<T>,
    key: impl Fn(&T) -> (DateTime<Utc>, i64),
    limit: Option<usize>,
) -> Vec<T> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}

impl PredictionStore for MemoryStore {
    fn insert_prediction(&self, record: &PredictionRecord) -> Result<i64> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        let id = tables.assign_id();
        tables.predictions.push(StoredPrediction {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    fn predictions(
        &self,
        owner: OwnerId,
        kind: PredictionKind,
        limit: Option<usize>,
    ) -> Result<Vec<StoredPrediction>> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        let rows = tables
            .predictions
            .iter()
            .filter(|p| p.record.owner == owner && p.record.kind() == kind)
            .cloned()
            .collect();
        Ok(newest_first(rows, |p| (p.record.created_at, p.id), limit))
    }

    fn insert_upload(&self, upload: &NewUpload) -> Result<UploadRecord> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        if tables.uploads.iter().any(|u| u.filename == upload.filename) {
            return Err(StoreError::DuplicateUpload(upload.filename.clone()));
        }
        let id = tables.assign_id();
        let record = UploadRecord {
            id,
            owner: upload.owner,
            filename: upload.filename.clone(),
            uploaded_at: upload.uploaded_at,
        };
        tables.uploads.push(record.clone());
        Ok(record)
    }

    fn uploads(&self, owner: OwnerId, limit: Option<usize>) -> Result<Vec<UploadRecord>> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        let rows = tables
            .uploads
            .iter()
            .filter(|u| u.owner == owner)
            .cloned()
            .collect();
        Ok(newest_first(rows, |u| (u.uploaded_at, u.id), limit))
    }

    fn find_upload(&self, owner: OwnerId, filename: &str) -> Result<Option<UploadRecord>> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables
            .uploads
            .iter()
            .find(|u| u.owner == owner && u.filename == filename)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::prediction::PredictionResult;
    use crate::types::request::PredictionRequest;
    use chrono::{Duration, TimeZone};

    fn risk_record(owner: i64, minutes: i64) -> PredictionRecord {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        PredictionRecord::at(
            OwnerId(owner),
            PredictionResult::SepsisRisk {
                is_sepsis: false,
                probability: 0.1,
            },
            PredictionRequest::new(),
            base + Duration::minutes(minutes),
        )
    }

    #[test]
    fn test_ids_are_unique() {
        let store = MemoryStore::new();
        let a = store.insert_prediction(&risk_record(1, 0)).unwrap();
        let b = store.insert_prediction(&risk_record(1, 1)).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.prediction_count(), 2);
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let store = MemoryStore::new();
        for minutes in [3, 1, 7, 5, 2, 6, 4] {
            store.insert_prediction(&risk_record(1, minutes)).unwrap();
        }
        store.insert_prediction(&risk_record(2, 99)).unwrap();

        let recent = store
            .predictions(OwnerId(1), PredictionKind::SepsisRisk, Some(5))
            .unwrap();
        assert_eq!(recent.len(), 5);
        let times: Vec<_> = recent.iter().map(|p| p.record.created_at).collect();
        let mut sorted = times.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(times, sorted);
        assert!(recent.iter().all(|p| p.record.owner == OwnerId(1)));
    }

    #[test]
    fn test_duplicate_upload_name_rejected() {
        let store = MemoryStore::new();
        let upload = NewUpload {
            owner: OwnerId(1),
            filename: "1_1740816000000000_labs.pdf".to_string(),
            uploaded_at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        };
        let first = store.insert_upload(&upload).unwrap();

        let again = NewUpload {
            owner: OwnerId(2),
            ..upload.clone()
        };
        assert!(matches!(
            store.insert_upload(&again),
            Err(StoreError::DuplicateUpload(_))
        ));
        assert_eq!(
            store.find_upload(OwnerId(1), &upload.filename).unwrap(),
            Some(first)
        );
        assert!(store.uploads(OwnerId(2), None).unwrap().is_empty());
    }

    #[test]
    fn test_kind_filter() {
        let store = MemoryStore::new();
        store.insert_prediction(&risk_record(1, 0)).unwrap();
        let survival = store
            .predictions(OwnerId(1), PredictionKind::Survival, None)
            .unwrap();
        assert!(survival.is_empty());
    }
}
