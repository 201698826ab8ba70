//! Logger configuration.
//!
//! The API base is environment-driven, like the rest of the storefront's
//! front-end settings. Everything else has defaults matching the collector's
//! expectations (25-event batches, 5 s flush interval).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;

/// Default endpoint path, relative to the API base.
pub const DEFAULT_EVENTS_PATH: &str = "audit/events";

/// Default batch size and size-flush threshold.
pub const DEFAULT_MAX_BATCH: usize = 25;

/// Default debounce interval for scheduled flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);

/// Default client-side request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const MIN_FLUSH_INTERVAL_MS: u64 = 50;
const MAX_BATCH_LIMIT: usize = 500;

/// Event logger configuration.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// API base URL (example: https://shop.example.com/api).
    pub api_base: String,

    /// Endpoint path joined onto the API base.
    pub events_path: String,

    /// Delay between the first queued event and the scheduled flush.
    pub flush_interval: Duration,

    /// Events per batch; reaching it triggers an immediate flush.
    pub max_batch: usize,

    /// Directory holding the persisted queue. Platform data dir when unset.
    pub queue_dir: Option<PathBuf>,

    /// Request timeout for the HTTP transport.
    pub http_timeout: Duration,
}

impl LoggerConfig {
    /// Configuration with defaults for everything but the API base.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            events_path: DEFAULT_EVENTS_PATH.to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_batch: DEFAULT_MAX_BATCH,
            queue_dir: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_base = var("STOREFRONT_API_BASE")
            .context("STOREFRONT_API_BASE is not set. Point it at the storefront API.")?;
        validate_api_base(&api_base)?;

        let events_path =
            var("STOREFRONT_EVENTS_PATH").unwrap_or_else(|| DEFAULT_EVENTS_PATH.to_string());

        let flush_interval_ms: u64 = var("STOREFRONT_FLUSH_INTERVAL_MS")
            .map(|v| v.parse())
            .transpose()
            .context("STOREFRONT_FLUSH_INTERVAL_MS must be an integer (milliseconds).")?
            .unwrap_or(DEFAULT_FLUSH_INTERVAL.as_millis() as u64);
        let flush_interval = Duration::from_millis(flush_interval_ms.max(MIN_FLUSH_INTERVAL_MS));

        let max_batch: usize = var("STOREFRONT_MAX_BATCH")
            .map(|v| v.parse())
            .transpose()
            .context("STOREFRONT_MAX_BATCH must be a positive integer.")?
            .unwrap_or(DEFAULT_MAX_BATCH)
            .clamp(1, MAX_BATCH_LIMIT);

        let queue_dir = var("STOREFRONT_QUEUE_DIR").map(PathBuf::from);

        let http_timeout_ms: u64 = var("STOREFRONT_HTTP_TIMEOUT_MS")
            .map(|v| v.parse())
            .transpose()
            .context("STOREFRONT_HTTP_TIMEOUT_MS must be an integer (milliseconds).")?
            .unwrap_or(DEFAULT_HTTP_TIMEOUT.as_millis() as u64);

        Ok(Self {
            api_base,
            events_path,
            flush_interval,
            max_batch,
            queue_dir,
            http_timeout: Duration::from_millis(http_timeout_ms),
        })
    }

    /// Directory for the persisted queue.
    pub fn queue_dir(&self) -> Result<PathBuf> {
        match &self.queue_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_queue_dir(),
        }
    }

    /// Absolute collector endpoint.
    pub fn endpoint(&self) -> String {
        join_endpoint(&self.api_base, &self.events_path)
    }
}

/// Platform data directory used when no queue directory is configured.
pub fn default_queue_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "storefront", "storefront")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))
}

/// Reject API bases that are empty or not http(s).
pub fn validate_api_base(base: &str) -> Result<()> {
    let lower = base.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        bail!("STOREFRONT_API_BASE must be an http:// or https:// URL, got {base:?}");
    }
    reqwest::Url::parse(base).with_context(|| format!("Invalid API base URL: {base}"))?;
    Ok(())
}

/// Join an endpoint path onto the API base.
///
/// The base keeps its own path and gets exactly one trailing slash; leading
/// slashes are stripped from `path`.
pub fn join_endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
