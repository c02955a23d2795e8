//! Schema command - print attribute declarations as JSON

use clap::ValueEnum;
use kustoform_provider::{ApplyResource, BuildDataSource, Provider};

use crate::error::{CliError, Result};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum SchemaTarget {
    /// The `kustomize_build` data source
    #[default]
    Build,
    /// The `kustomize_apply` resource
    Apply,
    /// The provider settings
    Provider,
}

pub fn run(target: SchemaTarget) -> Result<()> {
    let (name, schema) = match target {
        SchemaTarget::Build => (BuildDataSource::TYPE_NAME, BuildDataSource::schema()),
        SchemaTarget::Apply => (ApplyResource::TYPE_NAME, ApplyResource::schema()),
        SchemaTarget::Provider => (Provider::TYPE_NAME, Provider::schema()),
    };

    let document = serde_json::json!({ "type": name, "schema": schema });
    let json = serde_json::to_string_pretty(&document)
        .map_err(|e| CliError::validation(format!("failed to render schema: {}", e)))?;
    println!("{}", json);
    Ok(())
}
