//! Owner-scoped storage of uploaded PDF documents

use crate::error::UploadError;
use crate::store::PredictionStore;
use crate::types::request::OwnerId;
use crate::types::upload::{NewUpload, UploadRecord};
use chrono::{DateTime, SubsecRound, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Writes PDFs under one directory and records who uploaded them.
///
/// Files are only ever read back through [`UploadStorage::read`], which
/// requires an upload record for the requesting owner.
pub struct UploadStorage {
    root: PathBuf,
    store: Arc<dyn PredictionStore>,
}

impl UploadStorage {
    /// Use `root` for file storage, creating it if needed
    pub fn new(
        root: impl Into<PathBuf>,
        store: Arc<dyn PredictionStore>,
    ) -> Result<Self, UploadError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| UploadError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root, store })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate, write and record an uploaded file
    pub fn save(
        &self,
        owner: OwnerId,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<UploadRecord, UploadError> {
        self.save_at(owner, original_name, bytes, Utc::now().trunc_subsecs(6))
    }

    pub(crate) fn save_at(
        &self,
        owner: OwnerId,
        original_name: &str,
        bytes: &[u8],
        uploaded_at: DateTime<Utc>,
    ) -> Result<UploadRecord, UploadError> {
        let filename = stored_name(owner, uploaded_at, original_name)?;
        let path = self.root.join(&filename);

        // Only a file created here may be removed on the failure path below
        write_new(&path, bytes).map_err(|source| UploadError::Io {
            path: path.clone(),
            source,
        })?;

        let record = self.store.insert_upload(&NewUpload {
            owner,
            filename,
            uploaded_at,
        });

        match record {
            Ok(record) => {
                info!(
                    owner = %owner,
                    filename = %record.filename,
                    bytes = bytes.len(),
                    "PDF uploaded"
                );
                Ok(record)
            }
            Err(e) => {
                if let Err(remove_err) = std::fs::remove_file(&path) {
                    warn!(
                        path = %path.display(),
                        error = %remove_err,
                        "Failed to remove orphaned upload"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Owner's uploads, newest first
    pub fn list(
        &self,
        owner: OwnerId,
        limit: Option<usize>,
    ) -> Result<Vec<UploadRecord>, UploadError> {
        Ok(self.store.uploads(owner, limit)?)
    }

    /// File contents, if `owner` uploaded a file with this stored name
    pub fn read(&self, owner: OwnerId, filename: &str) -> Result<Vec<u8>, UploadError> {
        let record = self
            .store
            .find_upload(owner, filename)?
            .ok_or_else(|| UploadError::NotFound {
                filename: filename.to_string(),
            })?;

        let path = self.root.join(&record.filename);
        std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => UploadError::NotFound {
                filename: record.filename.clone(),
            },
            _ => UploadError::Io { path, source },
        })
    }
}

/// Write `bytes` to a file that must not exist yet
fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = file.write_all(bytes) {
        drop(file);
        if let Err(remove_err) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %remove_err, "Failed to remove partial upload");
        }
        return Err(e);
    }
    Ok(())
}

/// `{owner}_{micros}_{sanitised name}`, rejecting anything that is not a PDF
pub fn stored_name(
    owner: OwnerId,
    uploaded_at: DateTime<Utc>,
    original_name: &str,
) -> Result<String, UploadError> {
    if !original_name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(UploadError::NotPdf {
            filename: original_name.to_string(),
        });
    }

    let safe = secure_filename(original_name);
    if safe.len() <= ".pdf".len() || !safe.to_ascii_lowercase().ends_with(".pdf") {
        return Err(UploadError::EmptyFilename);
    }

    Ok(format!("{}_{}_{}", owner, uploaded_at.timestamp_micros(), safe))
}

/// Reduce a client-supplied name to ASCII letters, digits, `.`, `-` and `_`.
///
/// Path separators become word breaks, whitespace runs become `_`, and
/// leading or trailing dots and underscores are stripped, so the result can
/// never address a parent directory.
pub fn secure_filename(name: &str) -> String {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}
