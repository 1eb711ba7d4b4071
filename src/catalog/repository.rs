//! File repository for chunkdrive.
//!
//! CRUD over the `files` and `chunks` tables. Every query is scoped by user.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use super::folder::{FolderPath, FolderScope};
use super::types::{
    format_timestamp, parse_timestamp, validate_chunk_set, Chunk, FileWithChunks, NewChunk,
    NewFile, StoredFile,
};
use crate::{DriveError, Result};

const FILE_COLUMNS: &str = "id, name, size, mime_type, user_id, folder, iv, created_at";

/// Ids bound per `IN (...)` list, well under SQLite's host parameter limit.
const ID_BATCH: usize = 500;

/// Repository for file and chunk metadata.
pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Save a file and all of its chunks in one transaction.
    ///
    /// The chunk set is validated first; nothing is written if it is
    /// incomplete. Any store rejection rolls back and surfaces as
    /// [`DriveError::Persistence`].
    pub async fn save(&self, file: &NewFile, chunks: &[NewChunk]) -> Result<FileWithChunks> {
        validate_chunk_set(file.size, chunks)?;
        if file.name.trim().is_empty() {
            return Err(DriveError::Validation("file name is empty".to_string()));
        }
        if file.user_id.is_empty() {
            return Err(DriveError::Validation("user id is empty".to_string()));
        }

        let persist = |e: sqlx::Error| DriveError::Persistence(e.to_string());
        let mut tx = self.pool.begin().await.map_err(persist)?;

        sqlx::query(
            "INSERT INTO files (id, name, size, mime_type, user_id, folder, iv, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.id)
        .bind(&file.name)
        .bind(file.size)
        .bind(&file.mime_type)
        .bind(&file.user_id)
        .bind(file.folder.as_stored())
        .bind(&file.iv)
        .bind(format_timestamp(&file.created_at))
        .execute(&mut *tx)
        .await
        .map_err(persist)?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (file_id, chunk_index, size, message_id, url, iv)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&file.id)
            .bind(chunk.index)
            .bind(chunk.size)
            .bind(&chunk.message_id)
            .bind(&chunk.url)
            .bind(&chunk.iv)
            .execute(&mut *tx)
            .await
            .map_err(persist)?;
        }

        tx.commit().await.map_err(persist)?;
        debug!(
            "Saved file {} ({}) with {} chunk(s)",
            file.id,
            file.name,
            chunks.len()
        );

        let mut saved: Vec<Chunk> = chunks
            .iter()
            .map(|c| Chunk {
                index: c.index,
                size: c.size,
                message_id: c.message_id.clone(),
                url: c.url.clone(),
                iv: c.iv.clone(),
            })
            .collect();
        saved.sort_by_key(|c| c.index);

        Ok(FileWithChunks {
            file: StoredFile {
                id: file.id.clone(),
                name: file.name.clone(),
                size: file.size,
                mime_type: file.mime_type.clone(),
                user_id: file.user_id.clone(),
                folder: file.folder.as_stored().map(str::to_string),
                iv: file.iv.clone(),
                created_at: parse_timestamp(&format_timestamp(&file.created_at))?,
            },
            chunks: saved,
        })
    }

    /// List a user's files, newest first.
    pub async fn list(&self, scope: &FolderScope, user_id: &str) -> Result<Vec<StoredFile>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {FILE_COLUMNS} FROM files WHERE user_id = "));
        query.push_bind(user_id);

        match scope {
            FolderScope::All => {}
            FolderScope::Root => {
                query.push(" AND folder IS NULL");
            }
            FolderScope::Exact(path) => match path.as_stored() {
                Some(folder) => {
                    query.push(" AND folder = ");
                    query.push_bind(folder.to_string());
                }
                None => {
                    query.push(" AND folder IS NULL");
                }
            },
        }
        query.push(" ORDER BY created_at DESC, id");

        let rows: Vec<FileRow> = query.build_query_as().fetch_all(self.pool).await?;
        rows.into_iter().map(FileRow::into_file).collect()
    }

    /// Get a user's file by name with its chunks in index order.
    ///
    /// When several files share the name, the newest wins.
    pub async fn get(&self, name: &str, user_id: &str) -> Result<FileWithChunks> {
        self.find(name, user_id)
            .await?
            .ok_or_else(|| DriveError::NotFound(format!("file '{name}'")))
    }

    /// Like [`get`](Self::get) but absent files are `None`.
    ///
    /// The file row and its chunks are read in one transaction.
    pub async fn find(&self, name: &str, user_id: &str) -> Result<Option<FileWithChunks>> {
        let mut tx = self.pool.begin().await?;
        let row: Option<FileRow> = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE name = ? AND user_id = ?
             ORDER BY created_at DESC, id LIMIT 1"
        ))
        .bind(name)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let found = match row {
            Some(row) => Some(with_chunks(&mut *tx, row.into_file()?).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(found)
    }

    /// Get a user's file by id.
    pub async fn get_by_id(&self, id: &str, user_id: &str) -> Result<Option<FileWithChunks>> {
        let mut tx = self.pool.begin().await?;
        let row: Option<FileRow> = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let found = match row {
            Some(row) => Some(with_chunks(&mut *tx, row.into_file()?).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(found)
    }

    /// Every file of the user with this name, newest first.
    pub async fn get_all_by_name(&self, name: &str, user_id: &str) -> Result<Vec<FileWithChunks>> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<FileRow> = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE name = ? AND user_id = ?
             ORDER BY created_at DESC, id"
        ))
        .bind(name)
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut files = Vec::with_capacity(rows.len());
        for row in rows {
            files.push(with_chunks(&mut *tx, row.into_file()?).await?);
        }
        tx.commit().await?;
        Ok(files)
    }

    /// Chunks of a file in ascending index order.
    pub async fn chunks_for(&self, file_id: &str) -> Result<Vec<Chunk>> {
        let mut conn = self.pool.acquire().await?;
        chunks_of(&mut *conn, file_id).await
    }

    /// Delete every file of the user with this name; chunks cascade.
    ///
    /// Returns the number of files removed.
    pub async fn delete(&self, name: &str, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM files WHERE name = ? AND user_id = ?")
            .bind(name)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Files whose folder equals `folder` or lies beneath it.
    pub async fn list_under(&self, folder: &FolderPath, user_id: &str) -> Result<Vec<StoredFile>> {
        let Some(prefix) = folder.as_stored() else {
            return self.list(&FolderScope::All, user_id).await;
        };

        let rows: Vec<FileRow> = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE user_id = ? AND (folder = ? OR substr(folder, 1, length(?)) = ?)
             ORDER BY created_at DESC, id"
        ))
        .bind(user_id)
        .bind(prefix)
        .bind(prefix)
        .bind(prefix)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(FileRow::into_file).collect()
    }

    /// Remote handles of every chunk of the given files.
    pub async fn chunk_handles(&self, file_ids: &[String]) -> Result<Vec<String>> {
        let mut handles = Vec::new();
        for batch in file_ids.chunks(ID_BATCH) {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT chunk_index, size, message_id, url, iv FROM chunks WHERE file_id IN (",
            );
            let mut separated = query.separated(", ");
            for id in batch {
                separated.push_bind(id);
            }
            separated.push_unseparated(") ORDER BY file_id, chunk_index");

            let rows: Vec<ChunkRow> = query.build_query_as().fetch_all(self.pool).await?;
            handles.extend(
                rows.into_iter()
                    .filter_map(|row| row.into_chunk().remote_handle()),
            );
        }
        Ok(handles)
    }

    /// Delete the given files of a user in one transaction; chunks cascade.
    pub async fn delete_by_ids(&self, file_ids: &[String], user_id: &str) -> Result<u64> {
        if file_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for batch in file_ids.chunks(ID_BATCH) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM files WHERE user_id = ");
            query.push_bind(user_id);
            query.push(" AND id IN (");
            let mut separated = query.separated(", ");
            for id in batch {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            removed += query.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// Case-insensitive substring search on file names, newest first.
    pub async fn search(&self, user_id: &str, term: &str) -> Result<Vec<StoredFile>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<FileRow> = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE user_id = ? AND instr(lower(name), lower(?)) > 0
             ORDER BY created_at DESC, id"
        ))
        .bind(user_id)
        .bind(term)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(FileRow::into_file).collect()
    }

    /// The user's `limit` most recent files.
    pub async fn recent(&self, user_id: &str, limit: i64) -> Result<Vec<StoredFile>> {
        let rows: Vec<FileRow> = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE user_id = ?
             ORDER BY created_at DESC, id LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit.max(0))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(FileRow::into_file).collect()
    }

    /// Number of files the user owns.
    pub async fn count(&self, user_id: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}

async fn chunks_of(conn: &mut SqliteConnection, file_id: &str) -> Result<Vec<Chunk>> {
    let rows: Vec<ChunkRow> = sqlx::query_as(
        "SELECT chunk_index, size, message_id, url, iv
         FROM chunks WHERE file_id = ? ORDER BY chunk_index",
    )
    .bind(file_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(ChunkRow::into_chunk).collect())
}

async fn with_chunks(conn: &mut SqliteConnection, file: StoredFile) -> Result<FileWithChunks> {
    let chunks = chunks_of(conn, &file.id).await?;
    Ok(FileWithChunks { file, chunks })
}

/// Internal row type for files.
#[derive(sqlx::FromRow)]
struct FileRow {
    id: String,
    name: String,
    size: i64,
    mime_type: String,
    user_id: String,
    folder: Option<String>,
    iv: Option<String>,
    created_at: String,
}

impl FileRow {
    fn into_file(self) -> Result<StoredFile> {
        Ok(StoredFile {
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            name: self.name,
            size: self.size,
            mime_type: self.mime_type,
            user_id: self.user_id,
            folder: self.folder,
            iv: self.iv,
        })
    }
}

/// Internal row type for chunks.
#[derive(sqlx::FromRow)]
struct ChunkRow {
    chunk_index: i64,
    size: i64,
    message_id: Option<String>,
    url: String,
    iv: Option<String>,
}

impl ChunkRow {
    fn into_chunk(self) -> Chunk {
        Chunk {
            index: self.chunk_index,
            size: self.size,
            message_id: self.message_id,
            url: self.url,
            iv: self.iv,
        }
    }
}
