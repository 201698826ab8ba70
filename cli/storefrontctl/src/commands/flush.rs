//! Flush command.

use anyhow::Result;

use super::{deliver, CommandContext};

pub async fn run(ctx: CommandContext) -> Result<()> {
    let host = ctx.start_host()?;
    deliver(&ctx, &host).await
}
