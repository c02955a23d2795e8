//! The `kustomize_apply` resource
//!
//! Builds a configuration block and server-side applies every generated
//! object, recording what the API server returned. Objects are applied in
//! build order and deleted in reverse build order.

use std::collections::HashSet;
use std::sync::Arc;

use kustoform_core::declarations::{APPLY_RESOURCE, apply_resource_schema};
use kustoform_core::{KustomizeModel, Schema};
use kustoform_kube::{
    DeleteOutcome, ManagedState, ObjectIdentity, ObjectRef, ResourceClient, manifest_id,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{
    CREATE_FAILED, DELETE_FAILED, GET_FAILED, ProviderError, Result, STATE_OBJECTS_FAILED,
    UPDATE_FAILED,
};
use crate::provider::{ProviderData, parse_block};

/// Settable attributes of a `kustomize_apply` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyConfig {
    #[serde(flatten)]
    pub model: KustomizeModel,
    #[serde(default)]
    pub force_conflicts: bool,
    #[serde(default)]
    pub prune: bool,
}

/// Computed attributes of a `kustomize_apply` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyState {
    pub id: String,
    pub yaml: String,
    /// Objects returned by the API server, one JSON document each
    pub objects: Vec<String>,
}

impl ApplyState {
    fn new(yaml: String, objects: Vec<String>) -> Self {
        Self {
            id: manifest_id(&yaml),
            yaml,
            objects,
        }
    }

    /// Parse the recorded objects
    pub fn parsed_objects(&self) -> Result<Vec<Value>> {
        self.objects
            .iter()
            .map(|o| {
                serde_json::from_str(o)
                    .map_err(|e| ProviderError::operation(STATE_OBJECTS_FAILED, e))
            })
            .collect()
    }
}

impl From<&ManagedState> for ApplyState {
    fn from(state: &ManagedState) -> Self {
        Self {
            id: state.id.clone(),
            yaml: state.yaml.clone(),
            objects: state.objects.clone(),
        }
    }
}

/// Result of reading live objects back
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub state: ApplyState,
    /// Objects of the build that no longer exist on the cluster
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub state: ApplyState,
    /// Objects deleted because they left the build
    pub pruned: Vec<ObjectRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteReport {
    pub deleted: Vec<ObjectRef>,
    pub absent: Vec<ObjectRef>,
}

/// Builds and applies a configuration block
pub struct ApplyResource {
    data: ProviderData,
    resources: Arc<dyn ResourceClient>,
}

impl ApplyResource {
    pub const TYPE_NAME: &'static str = APPLY_RESOURCE;

    /// Fails when the provider has no Kubernetes connection
    pub fn new(data: &ProviderData) -> Result<Self> {
        let resources = data.resources.clone().ok_or(ProviderError::NotConfigured)?;
        Ok(Self {
            data: data.clone(),
            resources,
        })
    }

    pub fn schema() -> Schema {
        apply_resource_schema()
    }

    pub fn parse(block: &Value) -> Result<ApplyConfig> {
        parse_block(&Self::schema(), block)
    }

    #[tracing::instrument(skip_all, fields(resource = Self::TYPE_NAME))]
    pub async fn create(&self, block: &Value) -> Result<ApplyState> {
        let config = Self::parse(block)?;
        let (resmap, yaml) = self.data.build(&config.model).await?;

        let applied = self
            .apply_all(resmap.resources(), config.force_conflicts, CREATE_FAILED)
            .await?;

        tracing::info!(objects = applied.len(), "created objects");
        Ok(ApplyState::new(yaml, encode_objects(&applied, CREATE_FAILED)?))
    }

    #[tracing::instrument(skip_all, fields(resource = Self::TYPE_NAME))]
    pub async fn read(&self, block: &Value) -> Result<ReadOutcome> {
        let config = Self::parse(block)?;
        let (resmap, yaml) = self.data.build(&config.model).await?;

        let mut live = Vec::with_capacity(resmap.len());
        let mut warnings = Vec::new();
        let fetched = self.resources.get_all(resmap.resources()).await;

        for (object, result) in resmap.resources().iter().zip(fetched) {
            match result.map_err(|e| ProviderError::object(GET_FAILED, e))? {
                Some(found) => live.push(found),
                None => {
                    let reference = ObjectRef::from_value(object)
                        .map_err(|e| ProviderError::object(GET_FAILED, e))?;
                    tracing::warn!(object = %reference, "object not found");
                    warnings.push(format!("{} no longer exists", reference));
                }
            }
        }

        Ok(ReadOutcome {
            state: ApplyState::new(yaml, encode_objects(&live, GET_FAILED)?),
            warnings,
        })
    }

    /// Apply the new build over `prior`, deleting objects that left the build
    /// when `prune` is set
    #[tracing::instrument(skip_all, fields(resource = Self::TYPE_NAME))]
    pub async fn update(&self, block: &Value, prior: &ApplyState) -> Result<UpdateOutcome> {
        let config = Self::parse(block)?;
        let (resmap, yaml) = self.data.build(&config.model).await?;

        let applied = self
            .apply_all(resmap.resources(), config.force_conflicts, UPDATE_FAILED)
            .await?;

        let mut pruned = Vec::new();
        if config.prune {
            let current = references(&applied, UPDATE_FAILED)?;
            let previous = prior.parsed_objects()?;

            for object in previous.iter().rev() {
                let reference = ObjectRef::from_value(object)
                    .map_err(|e| ProviderError::object(DELETE_FAILED, e))?;
                if current.contains(&reference.identity()) {
                    continue;
                }

                self.resources
                    .delete(object)
                    .await
                    .map_err(|e| ProviderError::object(DELETE_FAILED, e))?;
                tracing::info!(object = %reference, "pruned object");
                pruned.push(reference);
            }
        }

        Ok(UpdateOutcome {
            state: ApplyState::new(yaml, encode_objects(&applied, UPDATE_FAILED)?),
            pruned,
        })
    }

    /// Delete the objects recorded in `state`, or those of a fresh build when
    /// none were recorded
    #[tracing::instrument(skip_all, fields(resource = Self::TYPE_NAME))]
    pub async fn delete(&self, block: &Value, state: &ApplyState) -> Result<DeleteReport> {
        let objects = if state.objects.is_empty() {
            let config = Self::parse(block)?;
            self.data.build(&config.model).await?.0.into_resources()
        } else {
            state.parsed_objects()?
        };

        let mut report = DeleteReport::default();
        for object in objects.iter().rev() {
            let reference = ObjectRef::from_value(object)
                .map_err(|e| ProviderError::object(DELETE_FAILED, e))?;
            let outcome = self
                .resources
                .delete(object)
                .await
                .map_err(|e| ProviderError::object(DELETE_FAILED, e))?;

            match outcome {
                DeleteOutcome::Deleted => report.deleted.push(reference),
                DeleteOutcome::AlreadyAbsent => {
                    tracing::debug!(object = %reference, "object already absent");
                    report.absent.push(reference);
                }
            }
        }

        tracing::info!(
            deleted = report.deleted.len(),
            absent = report.absent.len(),
            "deleted objects"
        );
        Ok(report)
    }

    async fn apply_all(
        &self,
        objects: &[Value],
        force: bool,
        summary: &'static str,
    ) -> Result<Vec<Value>> {
        let mut applied = Vec::with_capacity(objects.len());
        for object in objects {
            let live = self
                .resources
                .apply(object, force)
                .await
                .map_err(|e| ProviderError::object(summary, e))?;
            applied.push(live);
        }
        Ok(applied)
    }
}

fn encode_objects(objects: &[Value], summary: &'static str) -> Result<Vec<String>> {
    objects
        .iter()
        .map(|o| serde_json::to_string(o).map_err(|e| ProviderError::operation(summary, e)))
        .collect()
}

fn references(objects: &[Value], summary: &'static str) -> Result<HashSet<ObjectIdentity>> {
    objects
        .iter()
        .map(|o| {
            ObjectRef::from_value(o)
                .map(|r| r.identity())
                .map_err(|e| ProviderError::object(summary, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BUILD_FAILED, REST_CLIENT_FAILED};
    use kustoform_engine::MockKustomizer;
    use kustoform_kube::{MockResourceClient, ResourceCall};
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _workdir: TempDir,
        kustomizer: MockKustomizer,
        cluster: MockResourceClient,
        resource: ApplyResource,
    }

    fn fixture(objects: Vec<Value>, cluster: MockResourceClient) -> Fixture {
        let workdir = TempDir::new().unwrap();
        let kustomizer = MockKustomizer::new(objects);
        let data = ProviderData::new(Arc::new(kustomizer.clone()))
            .with_resources(Arc::new(cluster.clone()))
            .with_workdir(workdir.path());
        let resource = ApplyResource::new(&data).unwrap();

        Fixture {
            _workdir: workdir,
            kustomizer,
            cluster,
            resource,
        }
    }

    fn namespace(name: &str) -> Value {
        json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": name}})
    }

    fn config_map(name: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": "metallb-system"},
            "data": {"key": "value"}
        })
    }

    fn names(objects: &[String]) -> Vec<String> {
        objects
            .iter()
            .map(|o| {
                let v: Value = serde_json::from_str(o).unwrap();
                v["metadata"]["name"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn test_new_requires_cluster() {
        let data = ProviderData::new(Arc::new(MockKustomizer::default()));
        assert!(matches!(
            ApplyResource::new(&data),
            Err(ProviderError::NotConfigured)
        ));
    }

    #[test]
    fn test_parse_flags() {
        let config = ApplyResource::parse(&json!({
            "namespace": "apps",
            "force_conflicts": true,
            "prune": true
        }))
        .unwrap();
        assert_eq!(config.model.namespace.as_deref(), Some("apps"));
        assert!(config.force_conflicts);
        assert!(config.prune);

        let config = ApplyResource::parse(&json!({})).unwrap();
        assert!(!config.force_conflicts);
        assert!(!config.prune);
    }

    #[tokio::test]
    async fn test_create_applies_in_build_order() {
        let f = fixture(
            vec![namespace("metallb-system"), config_map("config")],
            MockResourceClient::new(),
        );

        let state = f
            .resource
            .create(&json!({"namespace": "metallb-system"}))
            .await
            .unwrap();

        assert_eq!(names(&state.objects), vec!["metallb-system", "config"]);
        assert_eq!(state.id, manifest_id(&state.yaml));

        let applied: Vec<_> = f
            .cluster
            .calls()
            .into_iter()
            .map(|c| match c {
                ResourceCall::Apply { object, force } => (object.kind, force),
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(
            applied,
            vec![("Namespace".to_string(), false), ("ConfigMap".to_string(), false)]
        );

        let recorded: Value = serde_json::from_str(&state.objects[1]).unwrap();
        assert!(recorded["metadata"]["resourceVersion"].is_string());
    }

    #[tokio::test]
    async fn test_create_unsupported_kind() {
        let f = fixture(
            vec![json!({"apiVersion": "example.com/v1", "kind": "Widget", "metadata": {"name": "w"}})],
            MockResourceClient::new().with_unsupported_kind("Widget"),
        );

        let err = f.resource.create(&json!({})).await.unwrap_err();
        assert_eq!(err.summary(), REST_CLIENT_FAILED);
        assert!(err.to_string().contains("example.com/v1/Widget"));
    }

    #[tokio::test]
    async fn test_create_conflict_and_force() {
        let f = fixture(
            vec![config_map("config")],
            MockResourceClient::new().with_failing_kind("ConfigMap"),
        );

        let err = f.resource.create(&json!({})).await.unwrap_err();
        assert_eq!(err.summary(), CREATE_FAILED);
        assert!(err.to_string().contains("conflict"));

        let state = f
            .resource
            .create(&json!({"force_conflicts": true}))
            .await
            .unwrap();
        assert_eq!(state.objects.len(), 1);
    }

    #[tokio::test]
    async fn test_create_build_failure_applies_nothing() {
        let f = fixture(vec![namespace("apps")], MockResourceClient::new());
        f.kustomizer.fail_with("Error: boom");

        let err = f.resource.create(&json!({})).await.unwrap_err();
        assert_eq!(err.summary(), BUILD_FAILED);
        assert!(f.cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_reports_vanished_objects() {
        let f = fixture(
            vec![namespace("metallb-system"), config_map("config")],
            MockResourceClient::new(),
        );
        f.resource.create(&json!({})).await.unwrap();
        assert!(f.cluster.remove(&config_map("config")));

        let outcome = f.resource.read(&json!({})).await.unwrap();

        assert_eq!(names(&outcome.state.objects), vec!["metallb-system"]);
        assert_eq!(
            outcome.warnings,
            vec!["ConfigMap metallb-system/config no longer exists"]
        );
    }

    #[tokio::test]
    async fn test_update_without_prune_keeps_removed_objects() {
        let f = fixture(
            vec![namespace("metallb-system"), config_map("old")],
            MockResourceClient::new(),
        );
        let prior = f.resource.create(&json!({})).await.unwrap();

        f.kustomizer
            .set_resources(vec![namespace("metallb-system"), config_map("new")]);
        let outcome = f.resource.update(&json!({}), &prior).await.unwrap();

        assert!(outcome.pruned.is_empty());
        assert_eq!(names(&outcome.state.objects), vec!["metallb-system", "new"]);
        assert_eq!(f.cluster.objects().len(), 3);
        assert_ne!(outcome.state.id, prior.id);
    }

    #[tokio::test]
    async fn test_update_prunes_removed_objects() {
        let f = fixture(
            vec![namespace("metallb-system"), config_map("old"), config_map("kept")],
            MockResourceClient::new(),
        );
        let prior = f.resource.create(&json!({})).await.unwrap();

        f.kustomizer
            .set_resources(vec![namespace("metallb-system"), config_map("kept")]);
        let outcome = f
            .resource
            .update(&json!({"prune": true}), &prior)
            .await
            .unwrap();

        assert_eq!(outcome.pruned.len(), 1);
        assert_eq!(outcome.pruned[0].name, "old");
        assert_eq!(f.cluster.objects().len(), 2);
    }

    #[tokio::test]
    async fn test_prune_keeps_object_moved_to_new_version() {
        let hpa = |api_version: &str| {
            json!({
                "apiVersion": api_version,
                "kind": "HorizontalPodAutoscaler",
                "metadata": {"name": "web", "namespace": "apps"}
            })
        };
        let f = fixture(vec![hpa("autoscaling/v1")], MockResourceClient::new());
        let prior = f.resource.create(&json!({})).await.unwrap();

        f.kustomizer.set_resources(vec![hpa("autoscaling/v2")]);
        let outcome = f
            .resource
            .update(&json!({"prune": true}), &prior)
            .await
            .unwrap();

        assert!(outcome.pruned.is_empty());
        assert_eq!(f.cluster.objects().len(), 1);
        assert_eq!(f.cluster.objects()[0]["apiVersion"], "autoscaling/v2");
        assert!(
            !f.cluster
                .calls()
                .iter()
                .any(|c| matches!(c, ResourceCall::Delete(_)))
        );
    }

    #[tokio::test]
    async fn test_delete_in_reverse_order() {
        let f = fixture(
            vec![namespace("metallb-system"), config_map("a"), config_map("b")],
            MockResourceClient::new(),
        );
        let state = f.resource.create(&json!({})).await.unwrap();
        f.cluster.remove(&config_map("b"));

        let report = f.resource.delete(&json!({}), &state).await.unwrap();

        let deleted: Vec<_> = report.deleted.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(deleted, vec!["a", "metallb-system"]);
        assert_eq!(report.absent[0].name, "b");
        assert!(f.cluster.objects().is_empty());
        assert!(f.kustomizer.builds().len() == 1);
    }

    #[tokio::test]
    async fn test_delete_rebuilds_without_recorded_objects() {
        let f = fixture(vec![namespace("apps")], MockResourceClient::new());
        f.resource.create(&json!({})).await.unwrap();

        let report = f
            .resource
            .delete(&json!({}), &ApplyState::default())
            .await
            .unwrap();

        assert_eq!(report.deleted.len(), 1);
        assert_eq!(f.kustomizer.builds().len(), 2);
    }
}
