//! Logger wiring for a native host process.

use std::sync::Arc;

use anyhow::{Context, Result};
use storefront_analytics::{
    EventLogger, EventLoggerBuilder, FileQueueStore, HttpBeacon, HttpTransport, InitOptions,
    LoggerConfig, PageLocation, SignalHub,
};
use tracing::debug;

/// A running logger and the file its queue is mirrored to.
pub struct Host {
    pub logger: EventLogger,
    pub store: Arc<FileQueueStore>,
    // Dropping the hub stops the logger's signal listener.
    _signals: SignalHub,
}

impl Host {
    /// Build the logger from config and run `init`.
    ///
    /// The queue lives in the configured queue directory so events survive
    /// between invocations.
    pub fn start(config: &LoggerConfig, token: Option<String>, page: PageLocation) -> Result<Self> {
        let queue_dir = config.queue_dir()?;
        let store = Arc::new(FileQueueStore::in_dir(&queue_dir));

        let transport = Arc::new(
            HttpTransport::new(config.http_timeout).context("Failed to build HTTP client")?,
        );

        let mut builder = EventLoggerBuilder::from_config(config)
            .store(Arc::clone(&store))
            .transport(Arc::clone(&transport));
        if let Some(beacon) = HttpBeacon::for_transport(&transport) {
            builder = builder.beacon(Arc::new(beacon));
        }
        let logger = builder.build().context("Failed to build event logger")?;

        let signals = SignalHub::new();
        let mut options = InitOptions::default()
            .with_path(config.events_path.clone())
            .with_location(page);
        if let Some(token) = token {
            options = options.with_access_token(move || Some(token.clone()));
        }
        logger.init(options, signals.subscribe());

        debug!(
            queue = %store.path().display(),
            queued = logger.queue_len(),
            "Host started"
        );

        Ok(Self {
            logger,
            store,
            _signals: signals,
        })
    }
}
