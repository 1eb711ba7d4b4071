//! File metadata catalog.
//!
//! Files and their ordered chunks live in the database; folders are derived
//! from each file's path string.

mod folder;
mod repository;
mod stats;
mod types;

pub use folder::{resolve, FolderPath, FolderScope, FolderView, MAX_FOLDER_DEPTH, ROOT};
pub use repository::FileRepository;
pub use stats::{classify, summarize, CategoryUsage, FileCategory, StorageStats};
pub use types::{
    message_id_from_url, validate_chunk_set, Chunk, FileWithChunks, NewChunk, NewFile, StoredFile,
};
