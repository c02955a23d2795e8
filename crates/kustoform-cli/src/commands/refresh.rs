//! Refresh command - read live objects back into state

use console::style;

use crate::context::Context;
use crate::error::Result;

pub async fn run(ctx: &Context, name: &str) -> Result<()> {
    let data = ctx.provider(true, ctx.explicit_workdir()).await?;
    let workspace = ctx.workspace(data).await?;

    let refreshed = workspace.refresh(name).await?;

    for warning in &refreshed.warnings {
        eprintln!("{} {}", style("⚠").yellow(), warning);
    }
    println!(
        "{} Refreshed {} (serial {}, {} object(s))",
        style("✓").green().bold(),
        style(name).cyan(),
        style(refreshed.state.serial).yellow(),
        refreshed.state.objects.len()
    );

    Ok(())
}
