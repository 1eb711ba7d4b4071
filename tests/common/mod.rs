//! Test helpers for integration tests.
//!
//! Provides a local fake of the messages API that stores attachments in
//! memory and can be scripted to answer with errors.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::Instant;

use chunkdrive::config::{BulkDeleteConfig, Config, RetryConfig, TransportConfig};

pub const BOT_TOKEN: &str = "test-bot-token";
pub const CHANNEL_ID: &str = "4242";

/// Which endpoint a request hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Upload,
    Delete,
    Fetch,
}

/// A canned error response.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub status: StatusCode,
    pub body: String,
    pub retry_after_header: Option<String>,
}

impl Scripted {
    /// A 429 with a JSON `retry_after` in seconds.
    pub fn rate_limited(secs: f64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: json!({
                "message": "You are being rate limited.",
                "retry_after": secs,
                "global": false
            })
            .to_string(),
            retry_after_header: None,
        }
    }

    /// A bare status with an empty body.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            body: String::new(),
            retry_after_header: None,
        }
    }
}

/// A request the fake received.
#[derive(Debug, Clone)]
pub struct Hit {
    pub endpoint: Endpoint,
    pub target: String,
    pub at: Instant,
}

#[derive(Default)]
struct FakeState {
    base_url: String,
    next_id: u64,
    attachments: HashMap<String, Vec<u8>>,
    scripts: HashMap<Endpoint, VecDeque<Scripted>>,
    reject_uploads_after: Option<(usize, StatusCode)>,
    uploads_accepted: usize,
    hits: Vec<Hit>,
}

type Shared = Arc<Mutex<FakeState>>;

/// Handle to a running fake messages API.
pub struct FakeDiscord {
    pub addr: SocketAddr,
    state: Shared,
}

impl FakeDiscord {
    /// Start the fake on an ephemeral port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake server");
        let addr = listener.local_addr().expect("Failed to read local addr");

        let state: Shared = Arc::new(Mutex::new(FakeState {
            base_url: format!("http://{addr}"),
            next_id: 900_000,
            ..FakeState::default()
        }));

        let app = Router::new()
            .route("/channels/:channel/messages", post(upload))
            .route("/channels/:channel/messages/:id", delete(remove))
            .route("/attachments/:channel/:id/:filename", get(fetch))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fake server failed");
        });

        Self { addr, state }
    }

    /// Base URL to use as `transport.api_base`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer the next request to `endpoint` with `response`.
    pub fn script(&self, endpoint: Endpoint, response: Scripted) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(endpoint)
            .or_default()
            .push_back(response);
    }

    /// Accept `n` uploads, then answer every later upload with `status`.
    pub fn reject_uploads_after(&self, n: usize, status: StatusCode) {
        self.state.lock().unwrap().reject_uploads_after = Some((n, status));
    }

    pub fn hits(&self, endpoint: Endpoint) -> Vec<Hit> {
        self.state
            .lock()
            .unwrap()
            .hits
            .iter()
            .filter(|h| h.endpoint == endpoint)
            .cloned()
            .collect()
    }

    /// Number of attachments currently stored.
    pub fn stored(&self) -> usize {
        self.state.lock().unwrap().attachments.len()
    }

    pub fn has_message(&self, id: &str) -> bool {
        self.state.lock().unwrap().attachments.contains_key(id)
    }

    /// Store an attachment directly and return its message id.
    pub fn seed(&self, bytes: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id.to_string();
        state.attachments.insert(id.clone(), bytes.to_vec());
        id
    }

    /// Transport settings pointing at this fake.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            api_base: self.base_url(),
            bot_token: BOT_TOKEN.to_string(),
            channel_id: CHANNEL_ID.to_string(),
            connect_timeout_secs: 2,
            total_timeout_secs: 10,
            ..TransportConfig::default()
        }
    }

    /// Full configuration with short retry delays.
    pub fn config(&self, chunk_size: usize) -> Config {
        let mut config = Config::default();
        config.transport = TransportConfig {
            chunk_size_bytes: chunk_size,
            ..self.transport_config()
        };
        config.retry = fast_retry();
        config.bulk_delete = BulkDeleteConfig {
            batch_size: 3,
            batch_pause_ms: 50,
        };
        config
    }
}

/// Retry policy with delays short enough for tests.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        server_error_base_delay_ms: 20,
        rate_limit_buffer_ms: 10,
        default_retry_after_ms: 50,
    }
}

fn record(state: &mut FakeState, endpoint: Endpoint, target: &str) -> Option<Scripted> {
    state.hits.push(Hit {
        endpoint,
        target: target.to_string(),
        at: Instant::now(),
    });
    state
        .scripts
        .get_mut(&endpoint)
        .and_then(|queue| queue.pop_front())
}

fn scripted_response(scripted: Scripted) -> Response {
    let mut response = (scripted.status, scripted.body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Some(value) = scripted.retry_after_header {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bot {BOT_TOKEN}"))
        .unwrap_or(false)
}

async fn upload(
    State(state): State<Shared>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut file: Option<(String, Bytes)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("files[0]") {
            let filename = field.file_name().unwrap_or("blob").to_string();
            if let Ok(bytes) = field.bytes().await {
                file = Some((filename, bytes));
            }
        }
    }

    let mut state = state.lock().unwrap();
    let target = file.as_ref().map(|(n, _)| n.clone()).unwrap_or_default();
    if let Some(scripted) = record(&mut state, Endpoint::Upload, &target) {
        return scripted_response(scripted);
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some((filename, bytes)) = file else {
        return (StatusCode::BAD_REQUEST, "missing files[0]").into_response();
    };
    if let Some((limit, status)) = state.reject_uploads_after {
        if state.uploads_accepted >= limit {
            return scripted_response(Scripted::status(status));
        }
    }

    state.uploads_accepted += 1;
    state.next_id += 1;
    let id = state.next_id.to_string();
    state.attachments.insert(id.clone(), bytes.to_vec());
    let url = format!(
        "{}/attachments/{}/{}/{}",
        state.base_url, channel, id, filename
    );

    Json(json!({
        "id": id,
        "channel_id": channel,
        "attachments": [{ "id": id, "filename": filename, "url": url }]
    }))
    .into_response()
}

async fn remove(
    State(state): State<Shared>,
    Path((_channel, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Some(scripted) = record(&mut state, Endpoint::Delete, &id) {
        return scripted_response(scripted);
    }
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.attachments.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => (
            StatusCode::NOT_FOUND,
            json!({"message": "Unknown Message", "code": 10008}).to_string(),
        )
            .into_response(),
    }
}

async fn fetch(
    State(state): State<Shared>,
    Path((_channel, id, _filename)): Path<(String, String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Some(scripted) = record(&mut state, Endpoint::Fetch, &id) {
        return scripted_response(scripted);
    }
    match state.attachments.get(&id) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
