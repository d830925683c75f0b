//! Uploaded PDF document metadata

use crate::types::request::OwnerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upload metadata before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUpload {
    pub owner: OwnerId,
    /// Stored file name (already namespaced and sanitised)
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Persisted upload row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: i64,
    pub owner: OwnerId,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
}
