//! Show command - display a managed state

use crate::context::Context;
use crate::display;
use crate::error::{CliError, Result};

pub async fn run(ctx: &Context, name: &str, history: bool, output_json: bool) -> Result<()> {
    let data = ctx.provider(false, ctx.explicit_workdir()).await?;
    let workspace = ctx.workspace(data).await?;

    if history {
        let states = workspace.history(name).await?;
        if output_json {
            return print_json(&states);
        }
        display::print_states(&states);
        return Ok(());
    }

    let state = workspace.show(name).await?;
    if output_json {
        return print_json(&state);
    }
    display::print_state(&state);
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::validation(format!("failed to render state: {}", e)))?;
    println!("{}", json);
    Ok(())
}
