//! # storefront-analytics
//!
//! Client-side analytics event logger for the storefront.
//!
//! UI collaborators call [`EventLogger::log`] fire-and-forget. The logger
//! stamps each event, attributes it from the current access token, keeps an
//! outbound FIFO queue mirrored to durable storage, and ships batches to the
//! collector endpoint:
//!
//! - on a debounced timer (default 5 s)
//! - as soon as the queue reaches the batch size (default 25)
//! - when the network comes back online
//! - when the page is hidden, preferring a beacon-style send
//!
//! A failed delivery puts the batch back at the head of the queue, so the
//! next flush retries it before anything logged later.
//!
//! The logger never surfaces errors to the code that logs events: storage
//! failures degrade to an in-memory queue, undecodable tokens degrade to
//! anonymous events, and delivery failures wait for the next flush.

pub mod claims;
pub mod config;
mod error;
pub mod logger;
pub mod signals;
pub mod storage;
pub mod transport;

pub use claims::{decode_claims, ClaimsDecode, ClaimsError, IdentityClaims};
pub use config::{default_queue_dir, join_endpoint, LoggerConfig};
pub use error::{BuildError, FlushError, StorageError, TransportError};
pub use logger::{EventLogger, EventLoggerBuilder, InitOptions, PageLocation, TokenSource};
pub use signals::{PlatformSignal, SignalHub, Visibility};
pub use storage::{FileQueueStore, MemoryQueueStore, QueueStore, STORAGE_KEY};
pub use transport::{
    Beacon, DeliveryRequest, DeliveryResponse, HttpBeacon, HttpTransport, Transport,
};

pub use storefront_events::{EventBatch, EventName, LoggedEvent, Props};
