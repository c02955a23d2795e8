//! Destroy command - delete applied objects and their state

use console::style;

use crate::context::Context;
use crate::error::Result;

pub async fn run(ctx: &Context, name: &str) -> Result<()> {
    let data = ctx.provider(true, ctx.explicit_workdir()).await?;
    let workspace = ctx.workspace(data).await?;

    let report = workspace.destroy(name).await?;

    for reference in &report.deleted {
        println!("  {} {}", style("-").red(), reference);
    }
    for reference in &report.absent {
        println!("  {} {} (already absent)", style("-").dim(), reference);
    }
    println!(
        "{} Destroyed {} ({} deleted, {} already absent)",
        style("✓").green().bold(),
        style(name).cyan(),
        report.deleted.len(),
        report.absent.len()
    );

    Ok(())
}
