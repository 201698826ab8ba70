//! The analytics event logger.
//!
//! One instance is built by the host at startup and cloned into every
//! collaborator that emits events. Clones share the same queue.
//!
//! Flush scheduling:
//!
//! ```text
//!   IDLE ──log (below threshold)──▶ SCHEDULED ──interval elapses──▶ IDLE + flush
//!     ▲                                  │
//!     └──────log (reaches threshold)─────┘  timer cancelled, flush now
//! ```
//!
//! Flushes may overlap (timer, threshold, online and hidden triggers are
//! independent). Each flush takes its own batch off the queue under the lock
//! before it suspends, so two flushes never carry the same event. A batch
//! that is off the queue but not yet settled is counted as in flight;
//! [`EventLogger::flush_all`] waits for those before it reports the queue
//! drained.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use storefront_events::{EventBatch, EventName, LoggedEvent, Props};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::claims::{decode_claims, ClaimsDecode};
use crate::config::{
    join_endpoint, LoggerConfig, DEFAULT_EVENTS_PATH, DEFAULT_FLUSH_INTERVAL, DEFAULT_HTTP_TIMEOUT,
    DEFAULT_MAX_BATCH,
};
use crate::signals::{PlatformSignal, Visibility};
use crate::storage::{MemoryQueueStore, QueueStore};
use crate::transport::{Beacon, DeliveryRequest, HttpTransport, Transport};
use crate::{BuildError, FlushError};

/// Access-token capability. Called on demand; the result is never cached.
pub type TokenSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Page the host is showing when the logger starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLocation {
    pub path: String,
    pub referrer: Option<String>,
}

impl PageLocation {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            referrer: None,
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

/// Options consumed by [`EventLogger::init`].
#[derive(Clone, Default)]
pub struct InitOptions {
    /// Endpoint path relative to the API base. Defaults to `audit/events`.
    pub path: Option<String>,

    pub get_access_token: Option<TokenSource>,

    /// Reported by the bootstrap `page_view`.
    pub location: PageLocation,
}

impl InitOptions {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_access_token<F>(mut self, get: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.get_access_token = Some(Arc::new(get));
        self
    }

    pub fn with_location(mut self, location: PageLocation) -> Self {
        self.location = location;
        self
    }
}

impl fmt::Debug for InitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitOptions")
            .field("path", &self.path)
            .field("get_access_token", &self.get_access_token.is_some())
            .field("location", &self.location)
            .finish()
    }
}

/// Pending timer flush.
struct ScheduledFlush {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    endpoint: Option<String>,
    token_source: Option<TokenSource>,
    queue: VecDeque<LoggedEvent>,
    timer: Option<ScheduledFlush>,
    timer_generation: u64,
    signal_task: Option<JoinHandle<()>>,
    in_flight: usize,
    delivered_total: u64,
}

struct Inner {
    api_base: String,
    flush_interval: Duration,
    max_batch: usize,
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn Transport>,
    beacon: Option<Arc<dyn Beacon>>,
    runtime: Handle,
    state: Mutex<State>,
    /// Woken whenever an in-flight batch settles.
    settled: Notify,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mirror the queue to storage. Failures leave the queue memory-only.
    fn persist(&self, state: &mut State) {
        if let Err(e) = self.store.save(state.queue.make_contiguous()) {
            warn!(error = %e, queued = state.queue.len(), "Failed to persist event queue");
        }
    }

    /// Current access token. An empty token counts as none.
    fn current_token(&self) -> Option<String> {
        let source = self.state().token_source.clone();
        source.and_then(|get| get()).filter(|token| !token.is_empty())
    }
}

/// One batch taken off the queue. Settles when dropped, after any requeue.
struct InFlight<'a> {
    inner: &'a Inner,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.inner.settled.notify_waiters();
    }
}

/// Buffered, persistent analytics event logger.
#[derive(Clone)]
pub struct EventLogger {
    inner: Arc<Inner>,
}

impl fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLogger")
            .field("api_base", &self.inner.api_base)
            .field("max_batch", &self.inner.max_batch)
            .field("queued", &self.queue_len())
            .finish_non_exhaustive()
    }
}

impl EventLogger {
    /// Start building a logger against the given API base.
    pub fn builder(api_base: impl Into<String>) -> EventLoggerBuilder {
        EventLoggerBuilder::new(api_base)
    }

    /// Resolve the endpoint, restore the persisted queue, subscribe to
    /// platform signals and emit the bootstrap `page_view`.
    ///
    /// Calling `init` again replaces the configuration and the signal
    /// subscription.
    pub fn init(&self, options: InitOptions, signals: broadcast::Receiver<PlatformSignal>) {
        let path = options.path.as_deref().unwrap_or(DEFAULT_EVENTS_PATH);
        let endpoint = join_endpoint(&self.inner.api_base, path);

        let restored = match self.inner.store.load() {
            Ok(events) => Some(events),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable persisted event queue");
                None
            }
        };
        let restored_count = restored.as_ref().map_or(0, Vec::len);

        {
            let mut state = self.inner.state();
            state.endpoint = Some(endpoint.clone());
            state.token_source = options.get_access_token;
            // Unreadable storage keeps whatever was logged in memory.
            if let Some(events) = restored {
                state.queue = events.into();
            }
            self.schedule_flush(&mut state);

            if let Some(previous) = state.signal_task.take() {
                previous.abort();
            }
            state.signal_task = Some(self.spawn_signal_listener(signals));
        }

        info!(endpoint = %endpoint, restored = restored_count, "Event logger initialized");

        let mut props = Props::new();
        props.insert("path".to_string(), options.location.path.into());
        props.insert(
            "ref".to_string(),
            options.location.referrer.unwrap_or_default().into(),
        );
        self.log(EventName::PageView, Some(props));
    }

    /// Queue an event. Never blocks on I/O and never fails.
    pub fn log(&self, name: EventName, props: Option<Props>) {
        let token = self.inner.current_token();
        let claims = match decode_claims(token.as_deref()) {
            ClaimsDecode::Undecodable(e) => {
                debug!(error = %e, "Access token claims not decodable; logging anonymously");
                Default::default()
            }
            decoded => decoded.into_claims(),
        };

        let event = LoggedEvent::builder(name)
            .props(props)
            .sid(claims.sid)
            .user_id(claims.sub)
            .build();

        let mut state = self.inner.state();
        state.queue.push_back(event);
        self.inner.persist(&mut state);

        let queued = state.queue.len();
        debug!(event = %name, queued, "Queued event");

        if queued >= self.inner.max_batch {
            Self::cancel_timer(&mut state);
            drop(state);
            self.spawn_flush(false, "batch_full");
        } else {
            self.schedule_flush(&mut state);
        }
    }

    /// Deliver up to one batch from the head of the queue.
    ///
    /// On failure the batch is back at the head of the queue, ahead of
    /// anything logged meanwhile, and the error is returned.
    pub async fn flush(&self, use_guaranteed_delivery: bool) -> Result<(), FlushError> {
        self.deliver_next(use_guaranteed_delivery).await.map(|_| ())
    }

    /// Flush batch after batch until the queue is empty and no batch is in
    /// flight.
    ///
    /// Returns the number of events delivered meanwhile, including batches
    /// that background flushes settled. Stops at the first failure.
    pub async fn flush_all(&self) -> Result<usize, FlushError> {
        let start = self.inner.state().delivered_total;
        loop {
            if self.deliver_next(false).await? > 0 {
                continue;
            }
            // A background flush that fails puts its batch back; go again.
            if !self.wait_in_flight().await {
                break;
            }
        }
        let delivered = self.inner.state().delivered_total - start;
        Ok(delivered as usize)
    }

    /// Stop the timer and the signal listener, then deliver everything.
    ///
    /// For native hosts about to exit.
    pub async fn shutdown(&self) -> Result<usize, FlushError> {
        {
            let mut state = self.inner.state();
            Self::cancel_timer(&mut state);
            if let Some(listener) = state.signal_task.take() {
                listener.abort();
            }
        }
        self.flush_all().await
    }

    /// Wait until no batch is in flight, without starting a flush.
    pub async fn settle(&self) {
        self.wait_in_flight().await;
    }

    /// Number of events waiting for delivery.
    pub fn queue_len(&self) -> usize {
        self.inner.state().queue.len()
    }

    /// Snapshot of the queue, oldest first.
    pub fn queued_events(&self) -> Vec<LoggedEvent> {
        self.inner.state().queue.iter().cloned().collect()
    }

    /// Collector endpoint, once `init` has run.
    pub fn endpoint(&self) -> Option<String> {
        self.inner.state().endpoint.clone()
    }

    /// Whether a timer flush is pending.
    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.state().timer.is_some()
    }

    pub fn max_batch(&self) -> usize {
        self.inner.max_batch
    }

    pub fn flush_interval(&self) -> Duration {
        self.inner.flush_interval
    }

    /// Returns whether it had to wait.
    async fn wait_in_flight(&self) -> bool {
        let mut waited = false;
        loop {
            // Registered before the check so a settle in between is not missed.
            let settled = self.inner.settled.notified();
            if self.inner.state().in_flight == 0 {
                return waited;
            }
            waited = true;
            settled.await;
        }
    }

    async fn deliver_next(&self, use_guaranteed_delivery: bool) -> Result<usize, FlushError> {
        let (endpoint, events) = {
            let mut state = self.inner.state();
            if state.queue.is_empty() {
                return Ok(0);
            }
            let Some(endpoint) = state.endpoint.clone() else {
                return Err(FlushError::NotInitialized);
            };

            let take = state.queue.len().min(self.inner.max_batch);
            let events: Vec<LoggedEvent> = state.queue.drain(..take).collect();
            state.in_flight += 1;
            self.inner.persist(&mut state);
            (endpoint, events)
        };
        let _in_flight = InFlight { inner: &self.inner };

        let count = events.len();
        let batch = EventBatch::new(events, self.inner.current_token());
        let body = match serde_json::to_vec(&batch) {
            Ok(body) => body,
            Err(e) => {
                self.requeue(batch.events);
                return Err(e.into());
            }
        };

        if use_guaranteed_delivery {
            if let Some(beacon) = &self.inner.beacon {
                if beacon.send(&endpoint, &body) {
                    debug!(count, "Batch handed to beacon");
                    self.record_delivered(count);
                    return Ok(count);
                }
                debug!(count, "Beacon refused batch; falling back to keepalive request");
            }
        }

        let request = DeliveryRequest {
            url: endpoint,
            body,
            bearer: batch.access_token.clone(),
            keepalive: use_guaranteed_delivery,
        };

        match self.inner.transport.post(request).await {
            Ok(response) if response.is_success() => {
                debug!(count, status = response.status, "Batch delivered");
                self.record_delivered(count);
                Ok(count)
            }
            Ok(response) => {
                self.requeue(batch.events);
                Err(FlushError::Rejected {
                    status: response.status,
                })
            }
            Err(e) => {
                self.requeue(batch.events);
                Err(e.into())
            }
        }
    }

    fn record_delivered(&self, count: usize) {
        self.inner.state().delivered_total += count as u64;
    }

    /// Put a failed batch back at the head of the queue, original order.
    fn requeue(&self, events: Vec<LoggedEvent>) {
        let mut state = self.inner.state();
        for event in events.into_iter().rev() {
            state.queue.push_front(event);
        }
        self.inner.persist(&mut state);
        debug!(queued = state.queue.len(), "Requeued undelivered batch");
    }

    fn schedule_flush(&self, state: &mut State) {
        if state.timer.is_some() {
            return;
        }

        state.timer_generation += 1;
        let generation = state.timer_generation;
        let interval = self.inner.flush_interval;
        let weak = Arc::downgrade(&self.inner);

        let handle = self.inner.runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            let Some(logger) = Self::upgrade(&weak) else {
                return;
            };
            {
                let mut state = logger.inner.state();
                if state
                    .timer
                    .as_ref()
                    .is_some_and(|t| t.generation == generation)
                {
                    state.timer = None;
                }
            }
            if let Err(e) = logger.flush(false).await {
                warn!(error = %e, "Scheduled event flush failed");
            }
        });

        state.timer = Some(ScheduledFlush { generation, handle });
    }

    fn cancel_timer(state: &mut State) {
        if let Some(timer) = state.timer.take() {
            timer.handle.abort();
        }
    }

    fn spawn_flush(&self, use_guaranteed_delivery: bool, trigger: &'static str) {
        let logger = self.clone();
        self.inner.runtime.spawn(async move {
            if let Err(e) = logger.flush(use_guaranteed_delivery).await {
                warn!(error = %e, trigger, "Event flush failed");
            }
        });
    }

    fn spawn_signal_listener(
        &self,
        mut signals: broadcast::Receiver<PlatformSignal>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);

        self.inner.runtime.spawn(async move {
            loop {
                let signal = match signals.recv().await {
                    Ok(signal) => signal,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed platform signals");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(logger) = Self::upgrade(&weak) else {
                    break;
                };

                match signal {
                    PlatformSignal::Online => logger.spawn_flush(false, "online"),
                    PlatformSignal::Visibility(Visibility::Hidden) => {
                        logger.spawn_flush(true, "hidden")
                    }
                    PlatformSignal::Visibility(Visibility::Visible) => {}
                }
            }
            debug!("Platform signal listener stopped");
        })
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

/// Builder for [`EventLogger`].
pub struct EventLoggerBuilder {
    api_base: String,
    flush_interval: Duration,
    max_batch: usize,
    http_timeout: Duration,
    store: Option<Arc<dyn QueueStore>>,
    transport: Option<Arc<dyn Transport>>,
    beacon: Option<Arc<dyn Beacon>>,
    runtime: Option<Handle>,
}

impl EventLoggerBuilder {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_batch: DEFAULT_MAX_BATCH,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            store: None,
            transport: None,
            beacon: None,
            runtime: None,
        }
    }

    /// Builder carrying the base, interval, batch size and timeout from config.
    pub fn from_config(config: &LoggerConfig) -> Self {
        Self::new(config.api_base.clone())
            .flush_interval(config.flush_interval)
            .max_batch(config.max_batch)
            .http_timeout(config.http_timeout)
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// Timeout for the default HTTP transport.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Queue storage. In-memory when unset.
    pub fn store<S: QueueStore + 'static>(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Request capability. reqwest-backed when unset.
    pub fn transport<T: Transport + 'static>(mut self, transport: Arc<T>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Beacon capability. Guaranteed-delivery flushes fall back to keepalive
    /// requests when unset.
    pub fn beacon<B: Beacon + 'static>(mut self, beacon: Arc<B>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    /// Runtime for timers and background flushes. The current runtime when
    /// unset.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<EventLogger, BuildError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.http_timeout)?),
        };

        let store: Arc<dyn QueueStore> = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryQueueStore::new()));

        Ok(EventLogger {
            inner: Arc::new(Inner {
                api_base: self.api_base,
                flush_interval: self.flush_interval,
                max_batch: self.max_batch,
                store,
                transport,
                beacon: self.beacon,
                runtime,
                state: Mutex::new(State::default()),
                settled: Notify::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalHub;
    use crate::transport::DeliveryResponse;
    use crate::TransportError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request with a fixed status.
    struct FixedStatus {
        status: u16,
        calls: AtomicUsize,
    }

    impl FixedStatus {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for FixedStatus {
        async fn post(&self, _: DeliveryRequest) -> Result<DeliveryResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DeliveryResponse {
                status: self.status,
            })
        }
    }

    fn logger(transport: Arc<FixedStatus>, store: Arc<MemoryQueueStore>) -> EventLogger {
        EventLogger::builder("https://shop.test/api/")
            .flush_interval(Duration::from_secs(3600))
            .transport(transport)
            .store(store)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = EventLogger::builder("https://shop.test").build();
        assert!(matches!(result, Err(BuildError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_flush_before_init_keeps_queue() {
        let transport = FixedStatus::new(200);
        let logger = logger(transport.clone(), Arc::new(MemoryQueueStore::new()));

        logger.log(EventName::NavMenuOpen, None);
        let err = logger.flush(false).await.unwrap_err();

        assert!(matches!(err, FlushError::NotInitialized));
        assert_eq!(logger.queue_len(), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_flush_empty_queue_is_noop() {
        let transport = FixedStatus::new(500);
        let logger = logger(transport.clone(), Arc::new(MemoryQueueStore::new()));

        logger.flush(false).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_init_resolves_endpoint_and_logs_page_view() {
        let logger = logger(FixedStatus::new(200), Arc::new(MemoryQueueStore::new()));
        let hub = SignalHub::new();

        logger.init(
            InitOptions::default()
                .with_path("/collect")
                .with_location(PageLocation::new("/catalog").with_referrer("https://ref.test")),
            hub.subscribe(),
        );

        assert_eq!(
            logger.endpoint().as_deref(),
            Some("https://shop.test/api/collect")
        );
        let events = logger.queued_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, EventName::PageView);
        assert_eq!(
            serde_json::Value::Object(events[0].props.clone().unwrap()),
            json!({"path": "/catalog", "ref": "https://ref.test"})
        );
        assert!(logger.is_flush_scheduled());
    }

    #[tokio::test]
    async fn test_default_path_and_empty_referrer() {
        let logger = logger(FixedStatus::new(200), Arc::new(MemoryQueueStore::new()));
        logger.init(InitOptions::default(), SignalHub::new().subscribe());

        assert_eq!(
            logger.endpoint().as_deref(),
            Some("https://shop.test/api/audit/events")
        );
        let props = logger.queued_events()[0].props.clone().unwrap();
        assert_eq!(props["ref"], json!(""));
    }

    #[tokio::test]
    async fn test_events_logged_before_init_survive_init() {
        let store = Arc::new(MemoryQueueStore::new());
        let logger = logger(FixedStatus::new(200), store.clone());

        logger.log(EventName::AuthModalOpen, None);
        logger.init(InitOptions::default(), SignalHub::new().subscribe());

        let names: Vec<_> = logger.queued_events().iter().map(|e| e.name).collect();
        assert_eq!(names, vec![EventName::AuthModalOpen, EventName::PageView]);
    }

    #[tokio::test]
    async fn test_every_mutation_is_persisted() {
        let store = Arc::new(MemoryQueueStore::new());
        let logger = logger(FixedStatus::new(503), store.clone());
        logger.init(InitOptions::default(), SignalHub::new().subscribe());
        logger.log(EventName::RegisterSubmit, None);

        assert_eq!(store.load().unwrap().len(), 2);

        let err = logger.flush(false).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(store.load().unwrap(), logger.queued_events());
    }

    #[tokio::test]
    async fn test_flush_all_drains_in_batches() {
        let transport = FixedStatus::new(200);
        let logger = EventLogger::builder("https://shop.test")
            .flush_interval(Duration::from_secs(3600))
            .max_batch(10)
            .transport(transport.clone())
            .build()
            .unwrap();
        logger.init(InitOptions::default(), SignalHub::new().subscribe());
        for _ in 0..8 {
            logger.log(EventName::SubmenuToggle, None);
        }

        // 9 queued, below the threshold of 10: no immediate flush.
        assert_eq!(logger.queue_len(), 9);
        for _ in 0..6 {
            logger.log(EventName::SubmenuToggle, None);
        }

        let delivered = logger.flush_all().await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(delivered, 15);
        assert_eq!(logger.queue_len(), 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_timer_and_drains() {
        let transport = FixedStatus::new(200);
        let logger = logger(transport.clone(), Arc::new(MemoryQueueStore::new()));
        logger.init(InitOptions::default(), SignalHub::new().subscribe());
        logger.log(EventName::NavMenuClose, None);
        assert!(logger.is_flush_scheduled());

        let delivered = logger.shutdown().await.unwrap();

        assert_eq!(delivered, 2);
        assert!(!logger.is_flush_scheduled());
        assert_eq!(logger.queue_len(), 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
