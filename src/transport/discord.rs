//! HTTP blob channel speaking the Discord-style messages API.
//!
//! One message per chunk in a fixed channel, the chunk as its only
//! attachment. Rate limits come back as HTTP 429 with a JSON
//! `retry_after` in seconds.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::channel::{BlobChannel, ChannelFailure, UploadedChunk};
use crate::config::TransportConfig;
use crate::{DriveError, Result};

/// User agent string for channel calls.
const USER_AGENT: &str = "chunkdrive/0.1";

#[derive(Debug, Deserialize)]
struct MessageBody {
    id: String,
    #[serde(default)]
    attachments: Vec<AttachmentBody>,
}

#[derive(Debug, Deserialize)]
struct AttachmentBody {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

/// Blob channel over the messages HTTP API.
pub struct DiscordChannel {
    client: Client,
    api_base: String,
    bot_token: String,
    channel_id: String,
}

impl DiscordChannel {
    /// Build a channel from transport configuration.
    ///
    /// Missing credentials are not an error here; uploads fail with a
    /// configuration error instead.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let api_base = Url::parse(&config.api_base)
            .map_err(|e| DriveError::Config(format!("invalid transport.api_base: {e}")))?;
        if !matches!(api_base.scheme(), "http" | "https") {
            return Err(DriveError::Config(format!(
                "transport.api_base must be http(s), got {}",
                api_base.scheme()
            )));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DriveError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            channel_id: config.channel_id.clone(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/channels/{}/messages", self.api_base, self.channel_id)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }
}

#[async_trait]
impl BlobChannel for DiscordChannel {
    fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.channel_id.is_empty()
    }

    async fn upload(
        &self,
        payload: &[u8],
        filename: &str,
    ) -> std::result::Result<UploadedChunk, ChannelFailure> {
        if !self.is_configured() {
            return Err(ChannelFailure::MissingCredentials);
        }

        let part = Part::bytes(payload.to_vec()).file_name(filename.to_string());
        let form = Form::new().part("files[0]", part);

        let response = self
            .client
            .post(self.messages_url())
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChannelFailure::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &headers, &body));
        }

        let message: MessageBody = response.json().await.map_err(|e| ChannelFailure::Rejected {
            status: status.as_u16(),
            message: format!("malformed message body: {e}"),
        })?;

        let attachment = message
            .attachments
            .into_iter()
            .next()
            .ok_or_else(|| ChannelFailure::Rejected {
                status: status.as_u16(),
                message: "message has no attachment".to_string(),
            })?;

        debug!("Uploaded {} as message {}", filename, message.id);
        Ok(UploadedChunk {
            message_id: message.id,
            url: attachment.url,
        })
    }

    async fn delete(&self, message_id: &str) -> std::result::Result<(), ChannelFailure> {
        if !self.is_configured() {
            return Err(ChannelFailure::MissingCredentials);
        }

        let response = self
            .client
            .delete(format!("{}/{}", self.messages_url(), message_id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| ChannelFailure::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &headers, &body))
    }

    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, ChannelFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ChannelFailure::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &headers, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ChannelFailure::Network(format!("failed to read body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Map a non-success response onto a channel failure.
fn classify_failure(status: StatusCode, headers: &HeaderMap, body: &str) -> ChannelFailure {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ChannelFailure::RateLimited {
            retry_after: retry_after_from_body(body).or_else(|| retry_after_from_headers(headers)),
        },
        StatusCode::NOT_FOUND => ChannelFailure::NotFound,
        s if s.is_server_error() => ChannelFailure::Server { status: s.as_u16() },
        s => ChannelFailure::Rejected {
            status: s.as_u16(),
            message: body.chars().take(200).collect(),
        },
    }
}

/// `retry_after` from a JSON rate-limit body, in (fractional) seconds.
fn retry_after_from_body(body: &str) -> Option<Duration> {
    let parsed: RateLimitBody = serde_json::from_str(body).ok()?;
    seconds_to_duration(parsed.retry_after?)
}

/// The standard `Retry-After` header, in seconds.
fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    seconds_to_duration(value.trim().parse().ok()?)
}

fn seconds_to_duration(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
