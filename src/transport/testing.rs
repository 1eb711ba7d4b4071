//! In-memory blob channel for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use super::channel::{BlobChannel, ChannelFailure, UploadedChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Upload,
    Delete,
    Fetch,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub kind: CallKind,
    pub target: String,
    pub at: Instant,
}

#[derive(Default)]
struct State {
    next_id: u64,
    blobs: HashMap<String, Vec<u8>>,
    messages: HashMap<String, String>,
    upload_script: VecDeque<ChannelFailure>,
    delete_script: HashMap<String, VecDeque<ChannelFailure>>,
    broken_uploads: HashSet<usize>,
    uploads_seen: usize,
    calls: Vec<Call>,
}

/// Stores uploads in memory and replays scripted failures.
pub(crate) struct MemoryChannel {
    configured: bool,
    state: Mutex<State>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self {
            configured: true,
            state: Mutex::new(State::default()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            state: Mutex::new(State::default()),
        }
    }

    /// Fail the next upload attempt with `failure`.
    pub fn fail_next_upload(&self, failure: ChannelFailure) {
        self.state.lock().unwrap().upload_script.push_back(failure);
    }

    /// Reject every attempt of the `n`-th distinct upload (0-based by filename order).
    pub fn break_upload(&self, n: usize) {
        self.state.lock().unwrap().broken_uploads.insert(n);
    }

    /// Fail the next delete attempt for `message_id` with `failure`.
    pub fn fail_next_delete(&self, message_id: &str, failure: ChannelFailure) {
        self.state
            .lock()
            .unwrap()
            .delete_script
            .entry(message_id.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Pretend a message exists without uploading through the channel.
    pub fn seed_message(&self, message_id: &str) {
        let url = format!("memory://attachments/0/{message_id}/seed.bin");
        let mut state = self.state.lock().unwrap();
        state.blobs.insert(url.clone(), Vec::new());
        state.messages.insert(message_id.to_string(), url);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    pub fn live_messages(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn has_message(&self, message_id: &str) -> bool {
        self.state.lock().unwrap().messages.contains_key(message_id)
    }

    fn record(state: &mut State, kind: CallKind, target: &str) {
        state.calls.push(Call {
            kind,
            target: target.to_string(),
            at: Instant::now(),
        });
    }
}

#[async_trait]
impl BlobChannel for MemoryChannel {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn upload(
        &self,
        payload: &[u8],
        filename: &str,
    ) -> Result<UploadedChunk, ChannelFailure> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, CallKind::Upload, filename);

        let is_retry = state
            .calls
            .iter()
            .filter(|c| c.kind == CallKind::Upload && c.target == filename)
            .count()
            > 1;
        if !is_retry {
            state.uploads_seen += 1;
        }
        if state.broken_uploads.contains(&(state.uploads_seen - 1)) {
            return Err(ChannelFailure::Rejected {
                status: 400,
                message: "broken upload".to_string(),
            });
        }
        if let Some(failure) = state.upload_script.pop_front() {
            return Err(failure);
        }

        state.next_id += 1;
        let message_id = format!("{}", 1000 + state.next_id);
        let url = format!("memory://attachments/0/{message_id}/{filename}");
        state.blobs.insert(url.clone(), payload.to_vec());
        state.messages.insert(message_id.clone(), url.clone());

        Ok(UploadedChunk { message_id, url })
    }

    async fn delete(&self, message_id: &str) -> Result<(), ChannelFailure> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, CallKind::Delete, message_id);

        if let Some(failure) = state
            .delete_script
            .get_mut(message_id)
            .and_then(|script| script.pop_front())
        {
            return Err(failure);
        }

        match state.messages.remove(message_id) {
            Some(url) => {
                state.blobs.remove(&url);
                Ok(())
            }
            None => Err(ChannelFailure::NotFound),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ChannelFailure> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, CallKind::Fetch, url);
        state.blobs.get(url).cloned().ok_or(ChannelFailure::NotFound)
    }
}
