//! Transport to the rate-limited blob channel.
//!
//! This module provides:
//! - The [`BlobChannel`] seam and its HTTP implementation
//! - A retrying [`TransportClient`] that honours the shared cooldown
//! - A batched [`BulkDeleter`] for best-effort cleanup

mod bulk;
mod channel;
mod client;
mod discord;

#[cfg(test)]
pub(crate) mod testing;

pub use bulk::{BulkDeleteReport, BulkDeleter};
pub use channel::{BlobChannel, ChannelFailure, UploadedChunk};
pub use client::{DeleteOutcome, TransportClient};
pub use discord::DiscordChannel;
