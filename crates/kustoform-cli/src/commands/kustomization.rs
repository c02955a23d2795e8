//! Kustomization command - print the descriptor generated from a block

use std::path::Path;

use kustoform_core::{KustomizeModel, to_kustomization};
use kustoform_provider::{BuildDataSource, ProviderError};

use crate::context::load_block;
use crate::error::{CliError, Result};

pub fn run(block_path: &Path) -> Result<()> {
    let block = load_block(block_path)?;

    BuildDataSource::schema()
        .validate(&block)
        .map_err(|violations| ProviderError::InvalidConfig { violations })?;
    let model: KustomizeModel =
        serde_json::from_value(block).map_err(|e| ProviderError::Decode {
            message: e.to_string(),
        })?;

    let yaml = to_kustomization(&model)
        .to_yaml()
        .map_err(|e| CliError::validation(format!("failed to render the kustomization: {}", e)))?;
    print!("{}", yaml);
    Ok(())
}
