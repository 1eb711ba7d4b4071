//! chunkdrive - chunked blob storage over a rate-limited message channel.
//!
//! Files are split into chunks, each chunk is posted as an attachment to a
//! remote channel, and the file-to-chunk mapping lives in SQLite.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod drive;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod transport;

pub use auth::{authenticate, bearer_token, IdentityProvider, JwtIdentityProvider};
pub use catalog::{
    Chunk, FileRepository, FileWithChunks, FolderPath, FolderScope, FolderView, NewChunk, NewFile,
    StorageStats, StoredFile,
};
pub use config::Config;
pub use db::Database;
pub use drive::Drive;
pub use error::{DriveError, Result};
pub use rate_limit::CooldownGate;
pub use transport::{
    BlobChannel, BulkDeleteReport, BulkDeleter, ChannelFailure, DeleteOutcome, DiscordChannel,
    TransportClient, UploadedChunk,
};
