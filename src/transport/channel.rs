//! The seam between the retrying client and a concrete blob channel.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the channel returns for a stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedChunk {
    /// Remote message handle, needed to delete the chunk later.
    pub message_id: String,
    /// Fetchable locator of the attachment bytes.
    pub url: String,
}

/// A single failed channel call, before any retry decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelFailure {
    /// The channel has no credentials to call with.
    #[error("transport credentials are not configured")]
    MissingCredentials,

    /// Rate limited; the server may say how long to wait.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Server-specified wait, if the response carried one.
        retry_after: Option<Duration>,
    },

    /// 5xx from the server.
    #[error("server error: HTTP {status}")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// The target message or attachment does not exist.
    #[error("not found")]
    NotFound,

    /// Any other rejection; not worth retrying.
    #[error("rejected: HTTP {status}: {message}")]
    Rejected {
        /// HTTP status code (0 if the response was malformed).
        status: u16,
        /// Short description.
        message: String,
    },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),
}

impl ChannelFailure {
    /// Whether the retry policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChannelFailure::RateLimited { .. } | ChannelFailure::Server { .. }
        )
    }
}

/// One-shot operations against a remote blob channel.
///
/// Implementations make exactly one attempt per call; cooldown and retry
/// live in [`TransportClient`](super::TransportClient).
#[async_trait]
pub trait BlobChannel: Send + Sync {
    /// Whether credentials are present.
    fn is_configured(&self) -> bool;

    /// Post one message carrying `payload` as its single attachment.
    async fn upload(&self, payload: &[u8], filename: &str)
        -> Result<UploadedChunk, ChannelFailure>;

    /// Delete one message.
    async fn delete(&self, message_id: &str) -> Result<(), ChannelFailure>;

    /// Download an attachment by locator.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ChannelFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_failures() {
        assert!(ChannelFailure::RateLimited { retry_after: None }.is_retryable());
        assert!(ChannelFailure::Server { status: 502 }.is_retryable());
        assert!(!ChannelFailure::NotFound.is_retryable());
        assert!(!ChannelFailure::MissingCredentials.is_retryable());
        assert!(!ChannelFailure::Network("reset".to_string()).is_retryable());
        assert!(!ChannelFailure::Rejected {
            status: 403,
            message: "forbidden".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(
            ChannelFailure::Server { status: 503 }.to_string(),
            "server error: HTTP 503"
        );
    }
}
