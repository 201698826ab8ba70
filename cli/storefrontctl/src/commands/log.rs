//! Log command.

use anyhow::Result;
use clap::Args;
use storefront_events::{parse_property, EventName, Props};

use super::{deliver, CommandContext};
use crate::error::CliError;

/// Log command.
#[derive(Debug, Args)]
pub struct LogCommand {
    /// Event name, e.g. `nav_menu_open`.
    event: String,

    /// Event property as key=value. Values that parse as JSON keep their type.
    #[arg(long = "prop", value_name = "KEY=VALUE")]
    props: Vec<String>,

    /// Queue the event without delivering it.
    #[arg(long)]
    no_flush: bool,
}

impl LogCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let name: EventName = self.event.parse().map_err(CliError::from)?;
        let props = collect_props(&self.props)?;

        let host = ctx.start_host()?;
        host.logger.log(name, props);

        if self.no_flush {
            // Reaching the batch size starts a flush; let it settle before exit.
            host.logger.settle().await;
            crate::output::print_info(&format!(
                "Queued {name}; {} event(s) waiting in {}",
                host.logger.queue_len(),
                host.store.path().display()
            ));
            return Ok(());
        }

        deliver(&ctx, &host).await
    }
}

/// Build the property map, or `None` when no properties were given.
fn collect_props(pairs: &[String]) -> Result<Option<Props>, CliError> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut props = Props::new();
    for pair in pairs {
        let (key, value) = parse_property(pair)?;
        props.insert(key, value);
    }
    Ok(Some(props))
}
