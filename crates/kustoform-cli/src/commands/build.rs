//! Build command - run the `kustomize_build` data source

use std::path::Path;

use console::style;
use kustoform_provider::BuildDataSource;

use crate::context::{Context, load_block};
use crate::error::{CliError, Result};

pub async fn run(ctx: &Context, block_path: &Path, output: Option<&Path>) -> Result<()> {
    let block = load_block(block_path)?;
    let data = ctx
        .provider(false, Some(ctx.workdir_for(block_path)))
        .await?;

    let built = BuildDataSource::new(&data).read(&block).await?;

    match output {
        Some(path) => {
            std::fs::write(path, &built.yaml)
                .map_err(|e| CliError::io(format!("failed to write {}", path.display()), e))?;
            eprintln!(
                "{} Wrote {} ({})",
                style("✓").green().bold(),
                style(path.display()).cyan(),
                crate::util::short_id(&built.id, 12)
            );
        }
        None => print!("{}", built.yaml),
    }

    Ok(())
}
