//! Database schema and migrations for chunkdrive.
//!
//! Migrations are applied in order; `schema_version` records how many have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: files and their ordered chunks
    r#"
-- One row per stored file. folder is NULL for the root.
CREATE TABLE files (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    size        INTEGER NOT NULL,
    mime_type   TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    folder      TEXT,
    iv          TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_files_user_folder ON files(user_id, folder);
CREATE INDEX idx_files_user_name ON files(user_id, name);
CREATE INDEX idx_files_created_at ON files(created_at);

-- Chunks are owned by their file and disappear with it.
CREATE TABLE chunks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id     TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    size        INTEGER NOT NULL,
    message_id  TEXT,
    url         TEXT NOT NULL,
    iv          TEXT,
    UNIQUE(file_id, chunk_index)
);

CREATE INDEX idx_chunks_file_id ON chunks(file_id);
"#,
];
