//! Error handling and display for the CLI.

use colored::Colorize;
use storefront_analytics::FlushError;
use storefront_events::{EventError, EventName};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Delivery failed: {source}")]
    Delivery {
        #[source]
        source: FlushError,
        /// Events still queued for the next run.
        queued: usize,
    },

    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] EventError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn delivery(source: FlushError, queued: usize) -> Self {
        Self::Delivery { source, queued }
    }
}

/// Hint shown under an error, if one applies.
pub fn hint(err: &CliError) -> Option<String> {
    match err {
        CliError::Delivery { source, queued } => {
            let retry = format!("{queued} event(s) stay queued; run `sfctl flush` to retry.");
            let hint = match source {
                FlushError::Rejected { status: 401 | 403 } => {
                    format!("The collector refused the access token. {retry}")
                }
                FlushError::Rejected { .. } => retry,
                FlushError::Transport(_) => format!(
                    "Check your network connection and STOREFRONT_API_BASE. {retry}"
                ),
                FlushError::NotInitialized | FlushError::Encode(_) => return None,
            };
            Some(hint)
        }
        CliError::InvalidEvent(EventError::UnknownEventName(_)) => Some(format!(
            "Known events: {}",
            EventName::ALL
                .iter()
                .map(|name| name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )),
        CliError::InvalidEvent(EventError::InvalidProperty(_)) => {
            Some("Pass properties as --prop key=value.".to_string())
        }
        CliError::InvalidEvent(EventError::Serialization(_)) => None,
        CliError::Other(_) => None,
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(hint) = err.downcast_ref::<CliError>().and_then(hint) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use storefront_analytics::TransportError;

    #[rstest]
    #[case(401, "refused the access token")]
    #[case(403, "refused the access token")]
    #[case(500, "3 event(s) stay queued")]
    fn rejected_delivery_hints(#[case] status: u16, #[case] expected: &str) {
        let err = CliError::delivery(FlushError::Rejected { status }, 3);
        assert!(hint(&err).unwrap().contains(expected));
    }

    #[test]
    fn transport_failure_points_at_api_base() {
        let err = CliError::delivery(
            FlushError::Transport(TransportError::Unreachable("refused".into())),
            1,
        );
        assert!(hint(&err).unwrap().contains("STOREFRONT_API_BASE"));
    }

    #[test]
    fn unknown_event_lists_known_names() {
        let err = CliError::from("checkout".parse::<EventName>().unwrap_err());
        let hint = hint(&err).unwrap();
        assert!(hint.contains("page_view"));
        assert!(hint.contains("register_fail"));
    }

    #[test]
    fn malformed_property_explains_format() {
        let err = CliError::from(EventError::InvalidProperty("menu".into()));
        assert!(hint(&err).unwrap().contains("key=value"));
    }
}
