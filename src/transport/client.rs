//! Retrying client over a [`BlobChannel`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::channel::{BlobChannel, ChannelFailure, UploadedChunk};
use crate::config::RetryConfig;
use crate::rate_limit::CooldownGate;
use crate::{DriveError, Result};

/// How a single remote delete ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The message was removed.
    Deleted,
    /// The channel reported the message missing; counts as success.
    AlreadyGone,
    /// Nothing was attempted (blank handle or no credentials).
    Skipped,
    /// Gave up after retries; the remote blob is orphaned.
    Failed(String),
}

impl DeleteOutcome {
    /// Whether the message is known to be gone.
    pub fn is_success(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted | DeleteOutcome::AlreadyGone)
    }
}

/// Uploads, deletes and fetches chunks with cooldown and bounded retry.
///
/// Every call waits on the shared [`CooldownGate`] before touching the
/// channel. Rate-limit responses extend that gate for all callers and are
/// retried after the server's wait plus a buffer; server errors are retried
/// after `attempt * base` delay. Everything else fails immediately.
pub struct TransportClient<C> {
    channel: C,
    gate: Arc<CooldownGate>,
    retry: RetryConfig,
}

impl<C: BlobChannel> TransportClient<C> {
    /// Create a client sharing `gate` with every other client on the same credential.
    pub fn new(channel: C, gate: Arc<CooldownGate>, retry: RetryConfig) -> Self {
        Self {
            channel,
            gate,
            retry,
        }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The cooldown gate this client waits on.
    pub fn gate(&self) -> &Arc<CooldownGate> {
        &self.gate
    }

    /// Upload one chunk.
    ///
    /// Fails immediately with [`DriveError::Config`] when the channel has no
    /// credentials; fails with [`DriveError::Transport`] once retries run out.
    pub async fn upload_chunk(&self, payload: &[u8], filename: &str) -> Result<UploadedChunk> {
        if !self.channel.is_configured() {
            return Err(DriveError::Config(
                "missing transport credentials (bot token / channel id)".to_string(),
            ));
        }

        self.with_retry("upload", filename, || self.channel.upload(payload, filename))
            .await
            .map_err(|(failure, attempts)| terminal_error(failure, attempts))
    }

    /// Delete one message, best-effort.
    ///
    /// Never returns an error: a missing message is success, and exhausted
    /// retries are logged and reported as [`DeleteOutcome::Failed`].
    pub async fn delete_message(&self, message_id: &str) -> DeleteOutcome {
        if message_id.trim().is_empty() {
            return DeleteOutcome::Skipped;
        }
        if !self.channel.is_configured() {
            warn!("Skipping delete of message {}: transport not configured", message_id);
            return DeleteOutcome::Skipped;
        }

        match self
            .with_retry("delete", message_id, || self.channel.delete(message_id))
            .await
        {
            Ok(()) => DeleteOutcome::Deleted,
            Err((ChannelFailure::NotFound, _)) => {
                debug!("Message {} already gone", message_id);
                DeleteOutcome::AlreadyGone
            }
            Err((failure, attempts)) => {
                error!(
                    "Failed to delete message {} after {} attempt(s): {}",
                    message_id, attempts, failure
                );
                DeleteOutcome::Failed(failure.to_string())
            }
        }
    }

    /// Download one chunk's bytes.
    pub async fn fetch_chunk(&self, url: &str) -> Result<Vec<u8>> {
        self.with_retry("fetch", url, || self.channel.fetch(url))
            .await
            .map_err(|(failure, attempts)| match failure {
                ChannelFailure::NotFound => DriveError::NotFound(format!("chunk at {url}")),
                other => terminal_error(other, attempts),
            })
    }

    /// Run `call` until it succeeds, fails terminally, or attempts run out.
    ///
    /// On failure returns the last channel failure and the attempts made.
    async fn with_retry<T, F, Fut>(
        &self,
        op: &str,
        target: &str,
        call: F,
    ) -> std::result::Result<T, (ChannelFailure, u32)>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, ChannelFailure>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.gate.await_ready().await;

            let failure = match call().await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            let delay = match self.retry_delay(&failure, attempt) {
                Some(delay) if attempt < max_attempts => delay,
                _ => return Err((failure, attempt)),
            };

            warn!(
                "Transport {} of {} failed ({}), retrying in {}ms (attempt {}/{})",
                op,
                target,
                failure,
                delay.as_millis(),
                attempt,
                max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Delay before the next attempt, or `None` if `failure` is not retryable.
    ///
    /// A rate limit also pushes the shared cooldown out, even when no retry follows.
    fn retry_delay(&self, failure: &ChannelFailure, attempt: u32) -> Option<Duration> {
        if !failure.is_retryable() {
            return None;
        }
        let wait = match failure {
            ChannelFailure::RateLimited { retry_after } => {
                let wait = retry_after.unwrap_or_else(|| self.retry.default_retry_after());
                self.gate.record_limit_hit(wait);
                wait
            }
            _ => self.retry.server_error_delay(attempt),
        };
        Some(wait + self.retry.buffer())
    }
}

fn terminal_error(failure: ChannelFailure, attempts: u32) -> DriveError {
    match failure {
        ChannelFailure::MissingCredentials => DriveError::Config(failure.to_string()),
        other => DriveError::Transport {
            attempts,
            message: other.to_string(),
        },
    }
}
