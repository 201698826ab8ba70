//! # storefront-events
//!
//! Analytics event vocabulary and wire format for the storefront front end.
//!
//! ## Design Principles
//!
//! - Event names form a closed set; collaborators cannot invent new kinds
//! - Logged events are immutable once stamped
//! - Identity fields (`sid`, `user_id`) are attribution only, never authorization
//!
//! ## Wire Format
//!
//! Events travel to the collector in batches:
//!
//! ```json
//! { "events": [{ "name": "page_view", "ts": 1700000000000, "sid": null, "user_id": null }],
//!   "access_token": "..." }
//! ```
//!
//! The same `LoggedEvent` JSON shape is used for the persisted queue.

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
