//! Apply command - create or update a managed state

use std::path::Path;

use console::style;
use serde_json::Value;

use crate::context::{Context, load_block};
use crate::error::Result;

pub async fn run(
    ctx: &Context,
    name: &str,
    block_path: &Path,
    force_conflicts: bool,
    prune: bool,
) -> Result<()> {
    let mut block = load_block(block_path)?;
    if let Some(attributes) = block.as_object_mut() {
        if force_conflicts {
            attributes.insert("force_conflicts".to_string(), Value::Bool(true));
        }
        if prune {
            attributes.insert("prune".to_string(), Value::Bool(true));
        }
    }

    let data = ctx
        .provider(true, Some(ctx.workdir_for(block_path)))
        .await?;
    let workspace = ctx.workspace(data).await?;

    println!(
        "{} Applying {} in workspace {}",
        style("→").blue().bold(),
        style(name).cyan(),
        style(workspace.name()).yellow()
    );

    let applied = workspace.apply(name, block).await?;

    for reference in &applied.pruned {
        println!("  {} {}", style("-").red(), reference);
    }
    println!(
        "{} Applied {} object(s) for {} (serial {})",
        style("✓").green().bold(),
        applied.state.objects.len(),
        style(&applied.state.name).cyan(),
        style(applied.state.serial).yellow()
    );
    if !applied.pruned.is_empty() {
        println!("  pruned {} object(s)", applied.pruned.len());
    }

    Ok(())
}
