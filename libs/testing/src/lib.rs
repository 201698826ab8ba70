//! Test doubles for the storefront event logger.
//!
//! Everything here stays in-process so scheduling tests can run on a paused
//! tokio clock without real sockets.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use storefront_analytics::{
    Beacon, DeliveryRequest, DeliveryResponse, QueueStore, StorageError, Transport,
    TransportError,
};
use storefront_events::{EventBatch, LoggedEvent};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted answer for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Status(u16),
    /// Fail without an HTTP answer.
    Unreachable,
}

/// Transport that records every request and answers from a script.
///
/// Once the script runs out every request gets `200`.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    script: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<DeliveryRequest>>,
    latency: Duration,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport answering with the given outcomes, in order.
    pub fn scripted(outcomes: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        })
    }

    /// Transport that answers `200` after `latency` on the tokio clock.
    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    pub fn push(&self, outcome: Outcome) {
        lock(&self.script).push_back(outcome);
    }

    pub fn requests(&self) -> Vec<DeliveryRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Decoded bodies of every request, in send order.
    pub fn batches(&self) -> Vec<EventBatch> {
        self.requests()
            .iter()
            .map(|r| decode_batch(&r.body))
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, request: DeliveryRequest) -> Result<DeliveryResponse, TransportError> {
        lock(&self.requests).push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match lock(&self.script).pop_front().unwrap_or(Outcome::Status(200)) {
            Outcome::Status(status) => Ok(DeliveryResponse { status }),
            Outcome::Unreachable => Err(TransportError::Unreachable(
                "scripted network failure".to_string(),
            )),
        }
    }
}

/// Beacon that records payloads and either accepts or refuses them.
#[derive(Debug)]
pub struct RecordingBeacon {
    accept: bool,
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingBeacon {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            accept: true,
            sent: Mutex::default(),
        })
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            accept: false,
            sent: Mutex::default(),
        })
    }

    /// Number of send attempts, accepted or not.
    pub fn attempts(&self) -> usize {
        lock(&self.sent).len()
    }

    pub fn urls(&self) -> Vec<String> {
        lock(&self.sent).iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn batches(&self) -> Vec<EventBatch> {
        lock(&self.sent)
            .iter()
            .map(|(_, body)| decode_batch(body))
            .collect()
    }
}

impl Beacon for RecordingBeacon {
    fn send(&self, url: &str, body: &[u8]) -> bool {
        lock(&self.sent).push((url.to_string(), body.to_vec()));
        self.accept
    }
}

/// Storage that is never available, like a browser with storage disabled.
#[derive(Debug, Default)]
pub struct FailingStore;

impl QueueStore for FailingStore {
    fn load(&self) -> Result<Vec<LoggedEvent>, StorageError> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }

    fn save(&self, _events: &[LoggedEvent]) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("quota exceeded".to_string()))
    }
}

/// Swappable access token, standing in for the auth layer's token storage.
#[derive(Debug, Clone, Default)]
pub struct TokenCell {
    token: Arc<Mutex<Option<String>>>,
}

impl TokenCell {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(Mutex::new(token)),
        }
    }

    pub fn set(&self, token: Option<String>) {
        *lock(&*self.token) = token;
    }

    /// Getter suitable for `InitOptions::with_access_token`.
    pub fn getter(&self) -> impl Fn() -> Option<String> + Send + Sync + 'static {
        let token = Arc::clone(&self.token);
        move || lock(&*token).clone()
    }
}

/// Unsigned three-part token carrying `claims` as its payload.
pub fn unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.unsigned")
}

/// Parse a request body as a batch.
///
/// # Panics
///
/// Panics if the body is not a valid batch.
pub fn decode_batch(body: &[u8]) -> EventBatch {
    serde_json::from_slice(body).expect("request body is not an event batch")
}
