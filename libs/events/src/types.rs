//! Event names and property types.
//!
//! The storefront front end emits a closed set of event kinds. Each kind has a
//! stable snake_case wire name that the collector indexes on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::EventError;

// =============================================================================
// Event Name Constants
// =============================================================================

/// All event names as constants.
pub mod event_names {
    // Navigation
    pub const PAGE_VIEW: &str = "page_view";
    pub const NAV_MENU_OPEN: &str = "nav_menu_open";
    pub const NAV_MENU_CLOSE: &str = "nav_menu_close";
    pub const SUBMENU_TOGGLE: &str = "submenu_toggle";

    // Auth modal
    pub const AUTH_MODAL_OPEN: &str = "auth_modal_open";

    // Registration
    pub const REGISTER_SUBMIT: &str = "register_submit";
    pub const REGISTER_SUCCESS: &str = "register_success";
    pub const REGISTER_FAIL: &str = "register_fail";
}

/// Free-form event properties (JSON object).
pub type Props = serde_json::Map<String, serde_json::Value>;

/// Kind of analytics event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    PageView,
    NavMenuOpen,
    NavMenuClose,
    SubmenuToggle,
    AuthModalOpen,
    RegisterSubmit,
    RegisterSuccess,
    RegisterFail,
}

impl EventName {
    /// Every known event name, in declaration order.
    pub const ALL: [EventName; 8] = [
        EventName::PageView,
        EventName::NavMenuOpen,
        EventName::NavMenuClose,
        EventName::SubmenuToggle,
        EventName::AuthModalOpen,
        EventName::RegisterSubmit,
        EventName::RegisterSuccess,
        EventName::RegisterFail,
    ];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::PageView => event_names::PAGE_VIEW,
            EventName::NavMenuOpen => event_names::NAV_MENU_OPEN,
            EventName::NavMenuClose => event_names::NAV_MENU_CLOSE,
            EventName::SubmenuToggle => event_names::SUBMENU_TOGGLE,
            EventName::AuthModalOpen => event_names::AUTH_MODAL_OPEN,
            EventName::RegisterSubmit => event_names::REGISTER_SUBMIT,
            EventName::RegisterSuccess => event_names::REGISTER_SUCCESS,
            EventName::RegisterFail => event_names::REGISTER_FAIL,
        }
    }

    /// Menu open/close event for the given menu state.
    pub fn nav_menu(open: bool) -> Self {
        if open {
            EventName::NavMenuOpen
        } else {
            EventName::NavMenuClose
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| EventError::UnknownEventName(s.to_string()))
    }
}

/// Parse a `key=value` pair into a property.
///
/// The value is read as JSON when it parses (`42`, `true`, `{"a":1}`),
/// otherwise it is kept as a plain string.
pub fn parse_property(pair: &str) -> Result<(String, serde_json::Value), EventError> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| EventError::InvalidProperty(format!("expected key=value, got {pair:?}")))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(EventError::InvalidProperty(format!(
            "empty key in {pair:?}"
        )));
    }

    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));

    Ok((key.to_string(), value))
}

// =============================================================================
// Tests
// =============================================================================
