//! Persistence for prediction records and upload metadata.
//!
//! The pipeline only hands finished records to a [`PredictionStore`]; the
//! store assigns identities and answers history queries ordered newest
//! first.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::types::prediction::{PredictionKind, PredictionRecord, StoredPrediction};
use crate::types::request::OwnerId;
use crate::types::upload::{NewUpload, UploadRecord};

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Append-only storage for predictions and uploads.
pub trait PredictionStore: Send + Sync {
    /// Insert a record and return its assigned id
    fn insert_prediction(&self, record: &PredictionRecord) -> Result<i64>;

    /// Owner's predictions of one kind, newest first, at most `limit`
    fn predictions(
        &self,
        owner: OwnerId,
        kind: PredictionKind,
        limit: Option<usize>,
    ) -> Result<Vec<StoredPrediction>>;

    fn insert_upload(&self, upload: &NewUpload) -> Result<UploadRecord>;

    /// Owner's uploads, newest first, at most `limit`
    fn uploads(&self, owner: OwnerId, limit: Option<usize>) -> Result<Vec<UploadRecord>>;

    /// Upload with this exact stored name, only if `owner` made it
    fn find_upload(&self, owner: OwnerId, filename: &str) -> Result<Option<UploadRecord>>;
}
