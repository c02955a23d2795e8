//! List command - list managed states of the workspace

use crate::context::Context;
use crate::display;
use crate::error::{CliError, Result};

pub async fn run(ctx: &Context, output_json: bool) -> Result<()> {
    let data = ctx.provider(false, ctx.explicit_workdir()).await?;
    let workspace = ctx.workspace(data).await?;

    let states = workspace.list().await?;

    if output_json {
        let json = serde_json::to_string_pretty(&states)
            .map_err(|e| CliError::validation(format!("failed to render states: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    if states.is_empty() {
        println!("No managed states in workspace {}", workspace.name());
        return Ok(());
    }

    display::print_states(&states);
    Ok(())
}
