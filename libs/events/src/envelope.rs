//! Logged events and the batch envelope sent to the collector.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventName, Props};

/// A single analytics event, stamped and attributed.
///
/// `sid` and `user_id` are always serialized (as `null` when unknown) so the
/// collector can tell "anonymous" apart from "field missing".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Event kind.
    pub name: EventName,

    /// Milliseconds since the Unix epoch.
    pub ts: i64,

    /// Event-specific properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Props>,

    /// Session id claim of the access token active when the event was logged.
    #[serde(default)]
    pub sid: Option<String>,

    /// Subject claim of the access token active when the event was logged.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl LoggedEvent {
    /// Creates a new event builder.
    pub fn builder(name: EventName) -> LoggedEventBuilder {
        LoggedEventBuilder::new(name)
    }

    /// When the event occurred, if `ts` is representable.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.ts).single()
    }

    /// Returns true if the event carries no identity.
    pub fn is_anonymous(&self) -> bool {
        self.sid.is_none() && self.user_id.is_none()
    }
}

/// Builder for logged events.
#[derive(Debug)]
pub struct LoggedEventBuilder {
    name: EventName,
    ts: Option<i64>,
    props: Option<Props>,
    sid: Option<String>,
    user_id: Option<String>,
}

impl LoggedEventBuilder {
    pub fn new(name: EventName) -> Self {
        Self {
            name,
            ts: None,
            props: None,
            sid: None,
            user_id: None,
        }
    }

    pub fn ts(mut self, ts: i64) -> Self {
        self.ts = Some(ts);
        self
    }

    pub fn props(mut self, props: Option<Props>) -> Self {
        self.props = props;
        self
    }

    pub fn sid(mut self, sid: Option<String>) -> Self {
        self.sid = sid;
        self
    }

    pub fn user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Builds the event, stamping the current time if no `ts` was given.
    pub fn build(self) -> LoggedEvent {
        LoggedEvent {
            name: self.name,
            ts: self.ts.unwrap_or_else(|| Utc::now().timestamp_millis()),
            props: self.props,
            sid: self.sid,
            user_id: self.user_id,
        }
    }
}

/// Request body for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<LoggedEvent>,

    /// Current bearer token, omitted when there is none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl EventBatch {
    pub fn new(events: Vec<LoggedEvent>, access_token: Option<String>) -> Self {
        Self {
            events,
            access_token,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
