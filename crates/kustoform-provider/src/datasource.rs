//! The `kustomize_build` data source

use kustoform_core::declarations::{BUILD_DATA_SOURCE, build_data_source_schema};
use kustoform_core::{KustomizeModel, Schema};
use kustoform_kube::manifest_id;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::provider::{ProviderData, parse_block};

/// Computed attributes of a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOutput {
    pub id: String,
    pub yaml: String,
}

/// Runs `kustomize build` for a configuration block
pub struct BuildDataSource {
    data: ProviderData,
}

impl BuildDataSource {
    pub const TYPE_NAME: &'static str = BUILD_DATA_SOURCE;

    pub fn new(data: &ProviderData) -> Self {
        Self { data: data.clone() }
    }

    pub fn schema() -> Schema {
        build_data_source_schema()
    }

    #[tracing::instrument(skip_all, fields(data_source = Self::TYPE_NAME))]
    pub async fn read(&self, block: &Value) -> Result<BuildOutput> {
        let model: KustomizeModel = parse_block(&Self::schema(), block)?;
        let (resmap, yaml) = self.data.build(&model).await?;

        tracing::info!(objects = resmap.len(), "built manifests");
        Ok(BuildOutput {
            id: manifest_id(&yaml),
            yaml,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BUILD_FAILED, ProviderError};
    use kustoform_engine::MockKustomizer;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn data_source(kustomizer: &MockKustomizer, workdir: &TempDir) -> BuildDataSource {
        let data = ProviderData::new(Arc::new(kustomizer.clone())).with_workdir(workdir.path());
        BuildDataSource::new(&data)
    }

    #[tokio::test]
    async fn test_read_returns_yaml_and_id() {
        let temp = TempDir::new().unwrap();
        let kustomizer = MockKustomizer::new(vec![
            json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "metallb-system"}}),
            json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "config", "namespace": "metallb-system"}}),
        ]);

        let output = data_source(&kustomizer, &temp)
            .read(&json!({"namespace": "metallb-system", "resources": ["base"]}))
            .await
            .unwrap();

        assert!(output.yaml.starts_with("apiVersion: v1\nkind: Namespace\n"));
        assert_eq!(output.yaml.matches("---\n").count(), 1);
        assert_eq!(output.id, manifest_id(&output.yaml));
        assert_eq!(output.id.len(), 64);
        assert_eq!(kustomizer.builds()[0].namespace, "metallb-system");
    }

    #[tokio::test]
    async fn test_read_is_stable() {
        let temp = TempDir::new().unwrap();
        let kustomizer = MockKustomizer::new(vec![json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "apps"}})]);
        let source = data_source(&kustomizer, &temp);

        let first = source.read(&json!({})).await.unwrap();
        let second = source.read(&json!({})).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_read_with_empty_attribute() {
        let temp = TempDir::new().unwrap();
        let kustomizer = MockKustomizer::default();

        let output = data_source(&kustomizer, &temp)
            .read(&json!({"namespace": "apps", "resources": null}))
            .await
            .unwrap();

        assert_eq!(output.yaml, "");
        assert!(kustomizer.builds()[0].resources.is_empty());
    }

    #[tokio::test]
    async fn test_read_empty_build() {
        let temp = TempDir::new().unwrap();
        let output = data_source(&MockKustomizer::default(), &temp)
            .read(&json!({}))
            .await
            .unwrap();
        assert_eq!(output.yaml, "");
    }

    #[tokio::test]
    async fn test_read_reports_build_failure() {
        let temp = TempDir::new().unwrap();
        let kustomizer = MockKustomizer::default();
        kustomizer.fail_with("Error: accumulating resources: missing.yaml");

        let err = data_source(&kustomizer, &temp)
            .read(&json!({"resources": ["missing.yaml"]}))
            .await
            .unwrap_err();

        assert_eq!(err.summary(), BUILD_FAILED);
        assert!(err.to_string().contains("missing.yaml"));
    }

    #[tokio::test]
    async fn test_read_rejects_computed_attributes() {
        let temp = TempDir::new().unwrap();
        let kustomizer = MockKustomizer::default();

        let err = data_source(&kustomizer, &temp)
            .read(&json!({"yaml": "kind: Namespace"}))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidConfig { .. }));
        assert!(kustomizer.builds().is_empty());
    }
}
