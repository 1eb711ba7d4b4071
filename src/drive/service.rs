//! High-level drive operations over the catalog and the blob transport.

use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::{
    resolve, summarize, FileRepository, FileWithChunks, FolderPath, FolderScope, FolderView,
    NewChunk, NewFile, StorageStats, StoredFile,
};
use crate::config::Config;
use crate::db::Database;
use crate::rate_limit::CooldownGate;
use crate::transport::{
    BlobChannel, BulkDeleteReport, BulkDeleter, DiscordChannel, TransportClient,
};
use crate::{DriveError, Result};

/// Chunked file storage for many users over one blob channel.
///
/// Owns the metadata store and a transport client; every transport call
/// made through a `Drive` shares one cooldown gate.
pub struct Drive<C> {
    db: Database,
    client: Arc<TransportClient<C>>,
    bulk: BulkDeleter<C>,
    chunk_size: usize,
}

impl Drive<DiscordChannel> {
    /// Build a drive over the HTTP channel described by `config`.
    pub fn connect(db: Database, config: &Config) -> Result<Self> {
        let channel = DiscordChannel::new(&config.transport)?;
        Ok(Self::new(db, channel, Arc::new(CooldownGate::new()), config))
    }
}

impl<C: BlobChannel> Drive<C> {
    /// Build a drive over `channel`, waiting on `gate` before every call.
    pub fn new(db: Database, channel: C, gate: Arc<CooldownGate>, config: &Config) -> Self {
        let client = Arc::new(TransportClient::new(channel, gate, config.retry.clone()));
        let bulk = BulkDeleter::new(Arc::clone(&client), config.bulk_delete.clone());
        Self {
            db,
            client,
            bulk,
            chunk_size: config.transport.chunk_size_bytes.max(1),
        }
    }

    /// The metadata database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The transport client.
    pub fn client(&self) -> &Arc<TransportClient<C>> {
        &self.client
    }

    fn files(&self) -> FileRepository<'_> {
        FileRepository::new(self.db.pool())
    }

    /// Persist a file and its already-uploaded chunks atomically.
    pub async fn save(&self, file: &NewFile, chunks: &[NewChunk]) -> Result<FileWithChunks> {
        self.files().save(file, chunks).await
    }

    /// List a user's files, newest first.
    pub async fn list(&self, scope: &FolderScope, user_id: &str) -> Result<Vec<StoredFile>> {
        self.files().list(scope, user_id).await
    }

    /// Get a file with its chunks in index order.
    pub async fn get(&self, name: &str, user_id: &str) -> Result<FileWithChunks> {
        self.files().get(name, user_id).await
    }

    /// Files and subfolder names directly inside `folder`.
    pub async fn browse(&self, folder: &FolderPath, user_id: &str) -> Result<FolderView> {
        let files = self.files().list(&FolderScope::All, user_id).await?;
        Ok(resolve(&files, folder))
    }

    /// Split `payload` into chunks, upload them in order, then save.
    ///
    /// The declared size is taken from the payload. If any chunk fails to
    /// upload, or the save is rejected, the chunks already uploaded are
    /// deleted and nothing is saved.
    pub async fn upload(&self, file: NewFile, payload: &[u8]) -> Result<FileWithChunks> {
        let file = NewFile {
            size: payload.len() as i64,
            ..file
        };
        let total = payload.len().div_ceil(self.chunk_size);
        info!(
            "Uploading {} ({} bytes) as {} chunk(s) for user {}",
            file.name, file.size, total, file.user_id
        );

        let mut chunks: Vec<NewChunk> = Vec::with_capacity(total);
        for (index, piece) in payload.chunks(self.chunk_size).enumerate() {
            let chunk_name = format!("{}_{}.bin", file.id, index);
            match self.client.upload_chunk(piece, &chunk_name).await {
                Ok(uploaded) => chunks.push(NewChunk::new(
                    index as i64,
                    piece.len() as i64,
                    uploaded.message_id,
                    uploaded.url,
                )),
                Err(e) => {
                    warn!(
                        "Upload of {} failed at chunk {}/{}: {}",
                        file.name,
                        index + 1,
                        total,
                        e
                    );
                    self.discard(&chunks).await;
                    return Err(e);
                }
            }
        }

        match self.files().save(&file, &chunks).await {
            Ok(saved) => {
                info!("Stored {} as file {}", saved.file.name, saved.file.id);
                Ok(saved)
            }
            Err(e) => {
                warn!("Save of {} rejected: {}", file.name, e);
                self.discard(&chunks).await;
                Err(e)
            }
        }
    }

    /// Fetch every chunk in index order and concatenate them.
    ///
    /// Fails before any fetch if the stored chunks do not cover the file.
    pub async fn download(&self, name: &str, user_id: &str) -> Result<Vec<u8>> {
        let file = self.files().get(name, user_id).await?;
        file.ensure_complete()?;
        let mut out = Vec::with_capacity(file.file.size.max(0) as usize);

        for chunk in &file.chunks {
            let bytes = self.client.fetch_chunk(&chunk.url).await?;
            if bytes.len() as i64 != chunk.size {
                return Err(DriveError::Transport {
                    attempts: 1,
                    message: format!(
                        "chunk {} of {} returned {} bytes, expected {}",
                        chunk.index,
                        name,
                        bytes.len(),
                        chunk.size
                    ),
                });
            }
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }

    /// Delete a file by name: remote chunks first (best-effort), then metadata.
    ///
    /// Every file of the user with that name at the time of the call is
    /// removed; a same-name upload that lands during the remote delete is
    /// kept. Returns the number of files deleted.
    pub async fn delete_file(&self, name: &str, user_id: &str) -> Result<u64> {
        let repo = self.files();
        let matches = repo.get_all_by_name(name, user_id).await?;
        if matches.is_empty() {
            return Err(DriveError::NotFound(format!("file '{name}'")));
        }

        let handles: Vec<String> = matches
            .iter()
            .flat_map(FileWithChunks::remote_handles)
            .collect();
        let ids: Vec<String> = matches.iter().map(|f| f.file.id.clone()).collect();
        self.bulk.bulk_delete(&handles).await;

        let removed = repo.delete_by_ids(&ids, user_id).await?;
        info!("Deleted {} file(s) named {} for user {}", removed, name, user_id);
        Ok(removed)
    }

    /// Delete every file in `folder` or beneath it.
    ///
    /// The root is refused. Remote chunks are removed best-effort before the
    /// metadata rows. Returns the number of files removed.
    pub async fn delete_folder(&self, folder: &str, user_id: &str) -> Result<u64> {
        let path = FolderPath::parse(folder)?;
        if path.is_root() {
            return Err(DriveError::Validation(
                "refusing to delete the root folder".to_string(),
            ));
        }

        let repo = self.files();
        let files = repo.list_under(&path, user_id).await?;
        if files.is_empty() {
            info!("Folder {} is empty for user {}", path, user_id);
            return Ok(0);
        }

        let ids: Vec<String> = files.iter().map(|f| f.id.clone()).collect();
        let handles = repo.chunk_handles(&ids).await?;
        let report = self.bulk.bulk_delete(&handles).await;

        let removed = repo.delete_by_ids(&ids, user_id).await?;
        info!(
            "Deleted folder {} for user {}: {} file(s), {} remote message(s) removed, {} orphaned",
            path,
            user_id,
            removed,
            report.deleted + report.already_gone,
            report.failed.len()
        );
        Ok(removed)
    }

    /// Best-effort delete of remote messages.
    pub async fn bulk_delete(&self, handles: &[String]) -> BulkDeleteReport {
        self.bulk.bulk_delete(handles).await
    }

    /// Usage summary for a user.
    pub async fn stats(&self, user_id: &str) -> Result<StorageStats> {
        let files = self.files().list(&FolderScope::All, user_id).await?;
        Ok(summarize(&files))
    }

    /// Case-insensitive name search.
    pub async fn search(&self, user_id: &str, term: &str) -> Result<Vec<StoredFile>> {
        self.files().search(user_id, term).await
    }

    /// Most recent files.
    pub async fn recent(&self, user_id: &str, limit: i64) -> Result<Vec<StoredFile>> {
        self.files().recent(user_id, limit).await
    }

    async fn discard(&self, chunks: &[NewChunk]) {
        let handles: Vec<String> = chunks.iter().filter_map(|c| c.message_id.clone()).collect();
        if handles.is_empty() {
            return;
        }
        let report = self.bulk.bulk_delete(&handles).await;
        if !report.is_clean() {
            warn!(
                "{} uploaded chunk(s) could not be cleaned up",
                report.failed.len()
            );
        }
    }
}
