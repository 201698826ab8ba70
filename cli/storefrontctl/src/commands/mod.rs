//! CLI commands.

mod flush;
mod log;
mod queue;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use storefront_analytics::{LoggerConfig, PageLocation};

use crate::error::CliError;
use crate::host::Host;
use crate::output::{print_info, print_single, print_success, OutputFormat};

/// sfctl - emit and deliver storefront analytics events.
#[derive(Debug, Parser)]
#[command(name = "sfctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, env = "STOREFRONT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Access token used to attribute events and authorize delivery.
    #[arg(long, global = true, env = "STOREFRONT_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Page path reported by the startup `page_view`.
    #[arg(long, global = true, default_value = "/")]
    page: String,

    /// Referrer reported by the startup `page_view`.
    #[arg(long, global = true)]
    referrer: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Log an event and deliver the queue.
    Log(log::LogCommand),

    /// Deliver everything in the persisted queue.
    Flush,

    /// Inspect or reset the persisted queue.
    Queue(queue::QueueCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let mut page = PageLocation::new(self.page);
        if let Some(referrer) = self.referrer {
            page = page.with_referrer(referrer);
        }

        let ctx = CommandContext {
            format: OutputFormat::parse(&self.format),
            token: self.token,
            page,
        };

        match self.command {
            Commands::Log(cmd) => cmd.run(ctx).await,
            Commands::Flush => flush::run(ctx).await,
            Commands::Queue(cmd) => cmd.run(ctx),
            Commands::Version => {
                println!("sfctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub format: OutputFormat,
    pub token: Option<String>,
    pub page: PageLocation,
}

impl CommandContext {
    /// Start the logger from `STOREFRONT_*` environment config.
    pub fn start_host(&self) -> Result<Host> {
        let config = LoggerConfig::from_env()?;
        Host::start(&config, self.token.clone(), self.page.clone())
    }
}

/// Summary of a delivery run.
#[derive(Debug, Serialize)]
struct DeliveryReport {
    endpoint: String,
    delivered: usize,
    queued: usize,
}

/// Deliver the whole queue and report the result.
async fn deliver(ctx: &CommandContext, host: &Host) -> Result<()> {
    let endpoint = host.logger.endpoint().unwrap_or_default();

    let delivered = match host.logger.shutdown().await {
        Ok(delivered) => delivered,
        Err(e) => return Err(CliError::delivery(e, host.logger.queue_len()).into()),
    };

    let report = DeliveryReport {
        endpoint,
        delivered,
        queued: host.logger.queue_len(),
    };

    match ctx.format {
        OutputFormat::Table => {
            print_success(&format!(
                "Delivered {} event(s) to {}",
                report.delivered, report.endpoint
            ));
            if report.queued > 0 {
                print_info(&format!("{} event(s) still queued", report.queued));
            }
        }
        OutputFormat::Json => print_single(&report),
    }
    Ok(())
}
