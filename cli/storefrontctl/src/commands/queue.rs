//! Queue command (inspect or reset the persisted queue).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use storefront_analytics::{default_queue_dir, FileQueueStore, QueueStore};
use storefront_events::LoggedEvent;
use tabled::Tabled;

use crate::output::{print_output, print_success};

use super::CommandContext;

/// Queue command.
#[derive(Debug, Args)]
pub struct QueueCommand {
    /// Queue directory. Defaults to the platform data directory.
    #[arg(long, global = true, env = "STOREFRONT_QUEUE_DIR")]
    queue_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: QueueSubcommand,
}

#[derive(Debug, Subcommand)]
enum QueueSubcommand {
    /// List queued events, oldest first.
    Show,

    /// Delete the persisted queue.
    Clear,
}

#[derive(Debug, Serialize, Tabled)]
struct QueueRow {
    #[tabled(rename = "Event")]
    name: String,

    #[tabled(rename = "Logged At")]
    logged_at: String,

    #[tabled(rename = "Session")]
    sid: String,

    #[tabled(rename = "User")]
    user_id: String,

    #[tabled(rename = "Props")]
    props: String,
}

impl From<&LoggedEvent> for QueueRow {
    fn from(event: &LoggedEvent) -> Self {
        Self {
            name: event.name.to_string(),
            logged_at: event
                .occurred_at()
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| event.ts.to_string()),
            sid: event.sid.clone().unwrap_or_else(|| "-".to_string()),
            user_id: event.user_id.clone().unwrap_or_else(|| "-".to_string()),
            props: event
                .props
                .as_ref()
                .map(|p| serde_json::Value::Object(p.clone()).to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

impl QueueCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let dir = match self.queue_dir {
            Some(dir) => dir,
            None => default_queue_dir()?,
        };
        let store = FileQueueStore::in_dir(dir);

        match self.command {
            QueueSubcommand::Show => show(&ctx, &store),
            QueueSubcommand::Clear => clear(&store),
        }
    }
}

fn show(ctx: &CommandContext, store: &FileQueueStore) -> Result<()> {
    let events = store
        .load()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;
    let rows: Vec<QueueRow> = events.iter().map(QueueRow::from).collect();
    print_output(&rows, ctx.format);
    Ok(())
}

fn clear(store: &FileQueueStore) -> Result<()> {
    store
        .clear()
        .with_context(|| format!("Failed to remove {}", store.path().display()))?;
    print_success(&format!("Cleared {}", store.path().display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storefront_events::EventName;

    #[test]
    fn row_renders_anonymous_event() {
        let event = LoggedEvent::builder(EventName::NavMenuOpen).ts(0).build();
        let row = QueueRow::from(&event);

        assert_eq!(row.name, "nav_menu_open");
        assert_eq!(row.logged_at, "1970-01-01T00:00:00+00:00");
        assert_eq!(row.sid, "-");
        assert_eq!(row.user_id, "-");
        assert_eq!(row.props, "-");
    }

    #[test]
    fn row_renders_props_as_json() {
        let mut props = storefront_events::Props::new();
        props.insert("path".to_string(), json!("/"));
        let event = LoggedEvent::builder(EventName::PageView)
            .props(Some(props))
            .sid(Some("s1".to_string()))
            .build();

        let row = QueueRow::from(&event);
        assert_eq!(row.props, r#"{"path":"/"}"#);
        assert_eq!(row.sid, "s1");
    }

    #[test]
    fn clear_then_load_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::in_dir(dir.path());
        store
            .save(&[LoggedEvent::builder(EventName::RegisterSubmit).build()])
            .unwrap();

        clear(&store).unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
