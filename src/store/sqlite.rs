//! SQLite-backed store

use super::{PredictionStore, Result};
use crate::error::StoreError;
use crate::types::prediction::{
    PredictionKind, PredictionRecord, PredictionResult, StoredPrediction,
};
use crate::types::request::{OwnerId, PredictionRequest};
use crate::types::upload::{NewUpload, UploadRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sepsis_predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    probability REAL NOT NULL,
    is_sepsis INTEGER NOT NULL,
    input_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sepsis_owner_created
    ON sepsis_predictions (owner_id, created_at DESC);

CREATE TABLE IF NOT EXISTS survival_predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    result TEXT NOT NULL,
    severity TEXT NOT NULL,
    input_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_survival_owner_created
    ON survival_predictions (owner_id, created_at DESC);

CREATE TABLE IF NOT EXISTS uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    filename TEXT NOT NULL UNIQUE,
    uploaded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_uploads_owner_uploaded
    ON uploads (owner_id, uploaded_at DESC);
";

/// Store persisting to a single SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at the provided sqlite path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened prediction database");
        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Fixed-width UTC timestamps so text order equals time order
fn encode_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidDbValue(format!("bad timestamp '{value}': {e}")))
}

/// SQLite treats a negative LIMIT as unbounded
fn sql_limit(limit: Option<usize>) -> i64 {
    limit
        .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
        .unwrap_or(-1)
}

struct SepsisRow {
    id: i64,
    owner_id: i64,
    probability: f64,
    is_sepsis: bool,
    input_json: String,
    created_at: String,
}

struct SurvivalRow {
    id: i64,
    owner_id: i64,
    result: String,
    severity: String,
    input_json: String,
    created_at: String,
}

impl SepsisRow {
    fn decode(self) -> Result<StoredPrediction> {
        let input: PredictionRequest = serde_json::from_str(&self.input_json)?;
        Ok(StoredPrediction {
            id: self.id,
            record: PredictionRecord::at(
                OwnerId(self.owner_id),
                PredictionResult::SepsisRisk {
                    is_sepsis: self.is_sepsis,
                    probability: self.probability,
                },
                input,
                decode_time(&self.created_at)?,
            ),
        })
    }
}

impl SurvivalRow {
    fn decode(self) -> Result<StoredPrediction> {
        let input: PredictionRequest = serde_json::from_str(&self.input_json)?;
        let outcome = self.result.parse().map_err(StoreError::InvalidDbValue)?;
        let severity = self.severity.parse().map_err(StoreError::InvalidDbValue)?;
        Ok(StoredPrediction {
            id: self.id,
            record: PredictionRecord::at(
                OwnerId(self.owner_id),
                PredictionResult::Survival { outcome, severity },
                input,
                decode_time(&self.created_at)?,
            ),
        })
    }
}

fn decode_upload_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn upload_from_parts(parts: (i64, i64, String, String)) -> Result<UploadRecord> {
    let (id, owner_id, filename, uploaded_at) = parts;
    Ok(UploadRecord {
        id,
        owner: OwnerId(owner_id),
        filename,
        uploaded_at: decode_time(&uploaded_at)?,
    })
}

impl PredictionStore for SqliteStore {
    fn insert_prediction(&self, record: &PredictionRecord) -> Result<i64> {
        let input_json = serde_json::to_string(&record.input)?;
        let created_at = encode_time(&record.created_at);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        match &record.result {
            PredictionResult::SepsisRisk {
                is_sepsis,
                probability,
            } => {
                tx.execute(
                    "INSERT INTO sepsis_predictions
                        (owner_id, probability, is_sepsis, input_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![record.owner.0, probability, is_sepsis, input_json, created_at],
                )?;
            }
            PredictionResult::Survival { outcome, severity } => {
                tx.execute(
                    "INSERT INTO survival_predictions
                        (owner_id, result, severity, input_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.owner.0,
                        outcome.as_str(),
                        severity.as_str(),
                        input_json,
                        created_at
                    ],
                )?;
            }
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    fn predictions(
        &self,
        owner: OwnerId,
        kind: PredictionKind,
        limit: Option<usize>,
    ) -> Result<Vec<StoredPrediction>> {
        let conn = self.conn()?;
        let limit = sql_limit(limit);

        match kind {
            PredictionKind::SepsisRisk => {
                let mut stmt = conn.prepare(
                    "SELECT id, owner_id, probability, is_sepsis, input_json, created_at
                     FROM sepsis_predictions
                     WHERE owner_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![owner.0, limit], |row| {
                    Ok(SepsisRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        probability: row.get(2)?,
                        is_sepsis: row.get(3)?,
                        input_json: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?;
                let records = rows
                    .map(|row| row.map_err(StoreError::from).and_then(SepsisRow::decode))
                    .collect::<Result<Vec<_>>>();
                records
            }
            PredictionKind::Survival => {
                let mut stmt = conn.prepare(
                    "SELECT id, owner_id, result, severity, input_json, created_at
                     FROM survival_predictions
                     WHERE owner_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![owner.0, limit], |row| {
                    Ok(SurvivalRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        result: row.get(2)?,
                        severity: row.get(3)?,
                        input_json: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?;
                let records = rows
                    .map(|row| row.map_err(StoreError::from).and_then(SurvivalRow::decode))
                    .collect::<Result<Vec<_>>>();
                records
            }
        }
    }

    fn insert_upload(&self, upload: &NewUpload) -> Result<UploadRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO uploads (owner_id, filename, uploaded_at) VALUES (?1, ?2, ?3)",
            params![upload.owner.0, upload.filename, encode_time(&upload.uploaded_at)],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::DuplicateUpload(upload.filename.clone())
            }
            other => StoreError::from(other),
        })?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(UploadRecord {
            id,
            owner: upload.owner,
            filename: upload.filename.clone(),
            uploaded_at: upload.uploaded_at,
        })
    }

    fn uploads(&self, owner: OwnerId, limit: Option<usize>) -> Result<Vec<UploadRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, filename, uploaded_at
             FROM uploads
             WHERE owner_id = ?1
             ORDER BY uploaded_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![owner.0, sql_limit(limit)], decode_upload_row)?;
        let uploads = rows
            .map(|row| row.map_err(StoreError::from).and_then(upload_from_parts))
            .collect::<Result<Vec<_>>>();
        uploads
    }

    fn find_upload(&self, owner: OwnerId, filename: &str) -> Result<Option<UploadRecord>> {
        let conn = self.conn()?;
        let parts = conn
            .query_row(
                "SELECT id, owner_id, filename, uploaded_at
                 FROM uploads
                 WHERE owner_id = ?1 AND filename = ?2",
                params![owner.0, filename],
                decode_upload_row,
            )
            .optional()?;
        parts.map(upload_from_parts).transpose()
    }
}
