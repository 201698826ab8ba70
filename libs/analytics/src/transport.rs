//! Delivery capabilities.
//!
//! The logger needs two things from the platform:
//! - a standard request: send bytes to a URL and learn the status
//! - a beacon: queue bytes for best-effort delivery and return immediately,
//!   usable while the host is being torn down
//!
//! Default implementations are backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::TransportError;

/// Largest payload a beacon accepts, matching browser `sendBeacon` limits.
pub const BEACON_MAX_BYTES: usize = 64 * 1024;

/// One POST of a serialized batch.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub url: String,

    /// JSON body.
    pub body: Vec<u8>,

    /// Bearer token for the `Authorization` header.
    pub bearer: Option<String>,

    /// Let the request outlive whoever is waiting on it.
    pub keepalive: bool,
}

/// Status returned by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryResponse {
    pub status: u16,
}

impl DeliveryResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Standard request capability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST the request. Any HTTP answer is `Ok`; only failing to get one is
    /// an error.
    async fn post(&self, request: DeliveryRequest) -> Result<DeliveryResponse, TransportError>;
}

/// Fire-and-forget send capability.
pub trait Beacon: Send + Sync {
    /// Queue `body` for delivery to `url`. Returns whether it was accepted.
    fn send(&self, url: &str, body: &[u8]) -> bool;
}

/// reqwest-backed transport.
///
/// Requests always carry credentials: the client keeps a cookie jar and
/// replays collector cookies on every later delivery.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        Ok(Self { client })
    }

    /// Shared cookie-carrying client, for building a matching beacon.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn build(&self, request: &DeliveryRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .body(request.body.clone());

        if let Some(token) = &request.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: DeliveryRequest) -> Result<DeliveryResponse, TransportError> {
        let builder = self.build(&request);

        let response = if request.keepalive {
            // Detached so it completes even if the caller is dropped.
            tokio::spawn(builder.send())
                .await
                .map_err(|_| TransportError::Aborted)??
        } else {
            builder.send().await?
        };

        let status = response.status().as_u16();
        debug!(url = %request.url, status, keepalive = request.keepalive, "Delivered batch request");
        Ok(DeliveryResponse { status })
    }
}

/// Beacon that spawns a detached POST onto the runtime.
#[derive(Debug, Clone)]
pub struct HttpBeacon {
    client: reqwest::Client,
    runtime: Handle,
}

impl HttpBeacon {
    pub fn new(client: reqwest::Client, runtime: Handle) -> Self {
        Self { client, runtime }
    }

    /// Beacon sharing the transport's cookie jar, on the current runtime.
    pub fn for_transport(transport: &HttpTransport) -> Option<Self> {
        Handle::try_current()
            .ok()
            .map(|runtime| Self::new(transport.client().clone(), runtime))
    }
}

impl Beacon for HttpBeacon {
    fn send(&self, url: &str, body: &[u8]) -> bool {
        if body.len() > BEACON_MAX_BYTES {
            debug!(bytes = body.len(), "Beacon payload too large");
            return false;
        }

        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec());
        let url = url.to_string();

        self.runtime.spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(url = %url, status = %response.status(), "Beacon rejected by collector");
                }
                Ok(_) => {}
                Err(e) => warn!(url = %url, error = %e, "Beacon send failed"),
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_response_success_range() {
        assert!(DeliveryResponse { status: 200 }.is_success());
        assert!(DeliveryResponse { status: 204 }.is_success());
        assert!(!DeliveryResponse { status: 199 }.is_success());
        assert!(!DeliveryResponse { status: 302 }.is_success());
        assert!(!DeliveryResponse { status: 500 }.is_success());
    }

    #[tokio::test]
    async fn test_beacon_refuses_oversized_payload() {
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        let beacon = HttpBeacon::for_transport(&transport).unwrap();
        let body = vec![b' '; BEACON_MAX_BYTES + 1];
        assert!(!beacon.send("http://127.0.0.1:9/never", &body));
    }

    #[test]
    fn test_beacon_needs_runtime() {
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        assert!(HttpBeacon::for_transport(&transport).is_none());
    }
}
