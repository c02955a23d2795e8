//! The `kustomize` provider: configuration and shared clients

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kustoform_core::declarations::{PROVIDER_TYPE, provider_schema};
use kustoform_core::{KustomizeModel, Schema};
use kustoform_engine::{KustomizeCli, Kustomizer, ResMap};
use kustoform_kube::{KubernetesConfig, ResourceClient, ResourceManager};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BUILD_FAILED, CLIENT_FAILED, ProviderError, Result, YAML_FAILED};

/// Provider settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesConfig>,
}

/// The provider itself
pub struct Provider;

impl Provider {
    pub const TYPE_NAME: &'static str = PROVIDER_TYPE;

    pub fn schema() -> Schema {
        provider_schema()
    }

    /// Validate the settings and create the clients handed to data sources
    /// and resources
    #[tracing::instrument(skip_all)]
    pub async fn configure(config: &ProviderConfig) -> Result<ProviderData> {
        validate(&Self::schema(), &serde_json::to_value(config).map_err(decode_error)?)?;

        let mut data = ProviderData::new(Arc::new(KustomizeCli::new()));

        if let Some(kubernetes) = &config.kubernetes {
            let client = kubernetes
                .client()
                .await
                .map_err(|e| ProviderError::operation(CLIENT_FAILED, e))?;
            tracing::debug!("kubernetes client configured");
            data = data.with_resources(Arc::new(ResourceManager::new(client)));
        }

        Ok(data)
    }
}

/// Clients shared by the data source and the resource
#[derive(Clone)]
pub struct ProviderData {
    pub kustomizer: Arc<dyn Kustomizer>,
    pub resources: Option<Arc<dyn ResourceClient>>,
    /// Directory relative references of configuration blocks resolve from,
    /// the process working directory when unset
    pub workdir: Option<PathBuf>,
}

impl ProviderData {
    pub fn new(kustomizer: Arc<dyn Kustomizer>) -> Self {
        Self {
            kustomizer,
            resources: None,
            workdir: None,
        }
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceClient>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Build a configuration block, returning the objects and their YAML
    pub(crate) async fn build(&self, model: &KustomizeModel) -> Result<(ResMap, String)> {
        let resmap = kustoform_engine::build(self.kustomizer.as_ref(), model, self.workdir())
            .await
            .map_err(|e| ProviderError::operation(BUILD_FAILED, e))?;
        let yaml = resmap
            .as_yaml()
            .map_err(|e| ProviderError::operation(YAML_FAILED, e))?;
        Ok((resmap, yaml))
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.as_deref().unwrap_or(Path::new("."))
    }
}

pub(crate) fn decode_error(e: serde_json::Error) -> ProviderError {
    ProviderError::Decode {
        message: e.to_string(),
    }
}

pub(crate) fn validate(schema: &Schema, block: &Value) -> Result<()> {
    schema
        .validate(block)
        .map_err(|violations| ProviderError::InvalidConfig { violations })
}

/// Validate a block against `schema` and decode it
///
/// Null attributes count as unset, as they do during validation.
pub(crate) fn parse_block<T: DeserializeOwned>(schema: &Schema, block: &Value) -> Result<T> {
    validate(schema, block)?;
    let mut block = block.clone();
    strip_nulls(&mut block);
    serde_json::from_value(block).map_err(decode_error)
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(attributes) => {
            attributes.retain(|_, v| !v.is_null());
            attributes.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}
