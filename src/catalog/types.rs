//! Catalog entities: files and their chunks.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::folder::FolderPath;
use crate::{DriveError, Result};

/// A stored file's metadata row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    /// Stable file identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Size in bytes (sum of chunk sizes).
    pub size: i64,
    /// Declared MIME type.
    pub mime_type: String,
    /// Owning user.
    pub user_id: String,
    /// Canonical folder path; `None` for the root.
    pub folder: Option<String>,
    /// File-scoped initialization vector, opaque to the core.
    pub iv: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl StoredFile {
    /// Folder this file lives in.
    pub fn folder_path(&self) -> FolderPath {
        FolderPath::from_stored(self.folder.clone())
    }
}

/// One persisted chunk of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// 0-based position in the file.
    pub index: i64,
    /// Size in bytes.
    pub size: i64,
    /// Remote message handle returned by the transport.
    pub message_id: Option<String>,
    /// Fetchable locator of the chunk bytes.
    pub url: String,
    /// Chunk-scoped initialization vector, if any.
    pub iv: Option<String>,
}

impl Chunk {
    /// The handle to delete this chunk's remote message with.
    ///
    /// Rows saved without a handle fall back to the id embedded in the
    /// attachment URL (`.../attachments/<channel>/<message>/<name>`).
    pub fn remote_handle(&self) -> Option<String> {
        match self.message_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Some(id.to_string()),
            _ => message_id_from_url(&self.url),
        }
    }
}

/// Extract the message id from an attachment URL.
pub fn message_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("attachments/")?;
    let mut parts = rest.split('/');
    let _channel = parts.next()?;
    let id = parts.next()?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

/// A file together with its chunks in ascending index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileWithChunks {
    /// File metadata.
    #[serde(flatten)]
    pub file: StoredFile,
    /// Chunks sorted by index.
    pub chunks: Vec<Chunk>,
}

impl FileWithChunks {
    /// Remote handles of every chunk that has one.
    pub fn remote_handles(&self) -> Vec<String> {
        self.chunks.iter().filter_map(Chunk::remote_handle).collect()
    }

    /// Fail unless the chunks cover the file exactly.
    ///
    /// A stored file whose chunk rows were lost must not be reassembled.
    pub fn ensure_complete(&self) -> Result<()> {
        check_layout(self.file.size, self.chunks.iter().map(|c| (c.index, c.size))).map_err(
            |reason| {
                DriveError::Database(format!(
                    "file {} ({}) is incomplete: {reason}",
                    self.file.id, self.file.name
                ))
            },
        )
    }
}

/// Data for saving a new file.
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Identifier; generated when not supplied.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Declared size in bytes.
    pub size: i64,
    /// Declared MIME type.
    pub mime_type: String,
    /// Owning user.
    pub user_id: String,
    /// Target folder.
    pub folder: FolderPath,
    /// File-scoped IV.
    pub iv: Option<String>,
    /// Creation time; defaults to now.
    pub created_at: DateTime<Utc>,
}

impl NewFile {
    /// Create a new file record in the root folder with a generated id.
    pub fn new(
        name: impl Into<String>,
        size: i64,
        mime_type: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            user_id: user_id.into(),
            folder: FolderPath::root(),
            iv: None,
            created_at: Utc::now(),
        }
    }

    /// Use a caller-supplied id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Place the file in `folder`.
    pub fn with_folder(mut self, folder: FolderPath) -> Self {
        self.folder = folder;
        self
    }

    /// Set the file IV.
    pub fn with_iv(mut self, iv: impl Into<String>) -> Self {
        self.iv = Some(iv.into());
        self
    }

    /// Override the creation time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Data for one chunk of a new file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChunk {
    pub index: i64,
    pub size: i64,
    pub message_id: Option<String>,
    pub url: String,
    pub iv: Option<String>,
}

impl NewChunk {
    /// Create a chunk record without an IV.
    pub fn new(index: i64, size: i64, message_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            index,
            size,
            message_id: Some(message_id.into()),
            url: url.into(),
            iv: None,
        }
    }
}

/// Check that `chunks` form a complete set for a file of `declared_size` bytes.
///
/// Indices must be exactly `0..k-1` once sorted and sizes must sum to the
/// declared size. An empty file has no chunks.
pub fn validate_chunk_set(declared_size: i64, chunks: &[NewChunk]) -> Result<()> {
    if let Some(bad) = chunks.iter().find(|c| c.url.trim().is_empty()) {
        return Err(DriveError::Validation(format!(
            "chunk {} has no locator",
            bad.index
        )));
    }
    check_layout(declared_size, chunks.iter().map(|c| (c.index, c.size)))
        .map_err(DriveError::Validation)
}

/// Index and size rules shared by the write path and the read path.
fn check_layout(
    declared_size: i64,
    parts: impl Iterator<Item = (i64, i64)>,
) -> std::result::Result<(), String> {
    if declared_size < 0 {
        return Err("file size is negative".to_string());
    }

    let mut parts: Vec<(i64, i64)> = parts.collect();
    parts.sort_unstable_by_key(|(index, _)| *index);

    let mut total: i64 = 0;
    for (expected, (index, size)) in parts.iter().enumerate() {
        if *index != expected as i64 {
            return Err(format!(
                "chunk indices must run 0..{} without gaps or duplicates",
                parts.len().saturating_sub(1)
            ));
        }
        if *size < 0 {
            return Err(format!("chunk {index} has negative size"));
        }
        total = total
            .checked_add(*size)
            .ok_or_else(|| "chunk sizes overflow".to_string())?;
    }

    if total != declared_size {
        return Err(format!(
            "chunk sizes sum to {total} bytes but file declares {declared_size}"
        ));
    }
    Ok(())
}

/// Timestamp column format; fixed width so text order is time order.
pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DriveError::Database(format!("invalid timestamp '{raw}': {e}")))
}
