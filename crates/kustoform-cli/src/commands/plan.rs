//! Plan command - compare a new build with the stored state

use std::path::Path;

use console::style;
use kustoform_provider::PlanAction;

use crate::context::{Context, load_block};
use crate::display;
use crate::error::{CliError, Result};

pub async fn run(ctx: &Context, name: &str, block_path: &Path, output_json: bool) -> Result<()> {
    let block = load_block(block_path)?;
    let data = ctx
        .provider(false, Some(ctx.workdir_for(block_path)))
        .await?;
    let workspace = ctx.workspace(data).await?;

    let plan = workspace.plan(name, &block).await?;

    if output_json {
        let json = serde_json::json!({
            "name": name,
            "workspace": workspace.name(),
            "action": match plan.action {
                PlanAction::Create => "create",
                PlanAction::Update => "update",
                PlanAction::NoChanges => "none",
            },
            "changes": plan.diff.changes,
        });
        let json = serde_json::to_string_pretty(&json)
            .map_err(|e| CliError::validation(format!("failed to render plan: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    match plan.action {
        PlanAction::NoChanges => {
            println!(
                "{} {} is up to date",
                style("✓").green().bold(),
                style(name).cyan()
            );
            return Ok(());
        }
        PlanAction::Create => println!(
            "{} {} will be created\n",
            style("→").blue().bold(),
            style(name).cyan()
        ),
        PlanAction::Update => println!(
            "{} {} will be updated\n",
            style("→").blue().bold(),
            style(name).cyan()
        ),
    }

    display::print_diff(&plan.diff);
    Ok(())
}
