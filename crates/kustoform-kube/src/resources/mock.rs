//! In-memory cluster for testing
//!
//! Applied objects are stored as-is with their namespace defaulted and a
//! resource version assigned. Every call is recorded.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{DEFAULT_NAMESPACE, DeleteOutcome, ObjectIdentity, ObjectRef, ResourceClient};
use crate::error::{KubeError, Result};

const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "PersistentVolume",
    "StorageClass",
    "PriorityClass",
];

/// A call made against [`MockResourceClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCall {
    Apply { object: ObjectRef, force: bool },
    Get(ObjectRef),
    Delete(ObjectRef),
}

#[derive(Default)]
struct Cluster {
    objects: BTreeMap<ObjectIdentity, Value>,
    unsupported: HashSet<String>,
    failing: HashSet<String>,
    calls: Vec<ResourceCall>,
    revision: u64,
}

/// In-memory [`ResourceClient`]
#[derive(Clone, Default)]
pub struct MockResourceClient {
    cluster: Arc<Mutex<Cluster>>,
}

impl MockResourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unsupported_kind(self, kind: &str) -> Self {
        self.set_unsupported_kind(kind);
        self
    }

    pub fn with_failing_kind(self, kind: &str) -> Self {
        self.set_failing_kind(kind);
        self
    }

    /// Report `kind` as not served by the API server
    pub fn set_unsupported_kind(&self, kind: &str) {
        self.with_cluster(|c| {
            c.unsupported.insert(kind.to_string());
        });
    }

    /// Reject applies of `kind` with a field manager conflict
    pub fn set_failing_kind(&self, kind: &str) {
        self.with_cluster(|c| {
            c.failing.insert(kind.to_string());
        });
    }

    /// Remove an object behind the client's back
    pub fn remove(&self, object: &Value) -> bool {
        let Ok(reference) = Self::reference(object) else {
            return false;
        };
        self.with_cluster(|c| c.objects.remove(&reference.identity()).is_some())
            .unwrap_or(false)
    }

    /// Live objects, ordered by identity
    pub fn objects(&self) -> Vec<Value> {
        self.with_cluster(|c| c.objects.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Calls made so far
    pub fn calls(&self) -> Vec<ResourceCall> {
        self.with_cluster(|c| c.calls.clone()).unwrap_or_default()
    }

    fn with_cluster<T>(&self, f: impl FnOnce(&mut Cluster) -> T) -> Option<T> {
        self.cluster.lock().ok().map(|mut c| f(&mut c))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Cluster>> {
        self.cluster
            .lock()
            .map_err(|e| KubeError::Storage(e.to_string()))
    }

    /// Identity with the namespace defaulted the way the server would
    fn reference(object: &Value) -> Result<ObjectRef> {
        let mut reference = ObjectRef::from_value(object)?;
        if reference.namespace.is_none() && !CLUSTER_SCOPED_KINDS.contains(&reference.kind.as_str())
        {
            reference.namespace = Some(DEFAULT_NAMESPACE.to_string());
        }
        Ok(reference)
    }

    fn check_supported(cluster: &Cluster, reference: &ObjectRef) -> Result<()> {
        if cluster.unsupported.contains(&reference.kind) {
            return Err(KubeError::UnsupportedResource {
                api_version: reference.api_version.clone(),
                kind: reference.kind.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceClient for MockResourceClient {
    async fn apply(&self, object: &Value, force: bool) -> Result<Value> {
        let reference = Self::reference(object)?;
        let mut cluster = self.lock()?;
        cluster.calls.push(ResourceCall::Apply {
            object: reference.clone(),
            force,
        });
        Self::check_supported(&cluster, &reference)?;

        if cluster.failing.contains(&reference.kind) && !force {
            return Err(KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: format!("Apply failed with 1 conflict: conflict with \"kubectl\" on {}", reference),
                reason: "Conflict".to_string(),
                code: 409,
            })));
        }

        cluster.revision += 1;
        let mut stored = object.clone();
        if let Some(metadata) = stored.get_mut("metadata").and_then(Value::as_object_mut) {
            if let Some(ns) = &reference.namespace {
                metadata.insert("namespace".to_string(), json!(ns));
            }
            metadata.insert(
                "resourceVersion".to_string(),
                json!(cluster.revision.to_string()),
            );
        }

        cluster.objects.insert(reference.identity(), stored.clone());
        Ok(stored)
    }

    async fn get(&self, object: &Value) -> Result<Option<Value>> {
        let reference = Self::reference(object)?;
        let mut cluster = self.lock()?;
        cluster.calls.push(ResourceCall::Get(reference.clone()));
        Self::check_supported(&cluster, &reference)?;

        Ok(cluster.objects.get(&reference.identity()).cloned())
    }

    async fn delete(&self, object: &Value) -> Result<DeleteOutcome> {
        let reference = Self::reference(object)?;
        let mut cluster = self.lock()?;
        cluster.calls.push(ResourceCall::Delete(reference.clone()));
        Self::check_supported(&cluster, &reference)?;

        Ok(match cluster.objects.remove(&reference.identity()) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::AlreadyAbsent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_map(name: &str) -> Value {
        json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": name}, "data": {"a": "b"}})
    }

    #[tokio::test]
    async fn test_apply_defaults_namespace() {
        let cluster = MockResourceClient::new();

        let applied = cluster.apply(&config_map("settings"), false).await.unwrap();
        assert_eq!(applied["metadata"]["namespace"], "default");
        assert_eq!(applied["metadata"]["resourceVersion"], "1");

        let live = cluster.get(&config_map("settings")).await.unwrap().unwrap();
        assert_eq!(live, applied);
    }

    #[tokio::test]
    async fn test_cluster_scoped_kind_keeps_no_namespace() {
        let cluster = MockResourceClient::new();
        let ns = json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "apps"}});

        let applied = cluster.apply(&ns, false).await.unwrap();
        assert!(applied["metadata"].get("namespace").is_none());
    }

    #[tokio::test]
    async fn test_delete_outcomes() {
        let cluster = MockResourceClient::new();
        cluster.apply(&config_map("settings"), false).await.unwrap();

        assert_eq!(cluster.delete(&config_map("settings")).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(
            cluster.delete(&config_map("settings")).await.unwrap(),
            DeleteOutcome::AlreadyAbsent
        );
        assert_eq!(cluster.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_and_failing_kinds() {
        let cluster = MockResourceClient::new()
            .with_unsupported_kind("Widget")
            .with_failing_kind("ConfigMap");

        let widget = json!({"apiVersion": "example.com/v1", "kind": "Widget", "metadata": {"name": "w"}});
        let err = cluster.apply(&widget, false).await.unwrap_err();
        assert!(matches!(err, KubeError::UnsupportedResource { .. }));

        let err = cluster.apply(&config_map("settings"), false).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(cluster.apply(&config_map("settings"), true).await.is_ok());
    }

    #[tokio::test]
    async fn test_versions_share_one_object() {
        let cluster = MockResourceClient::new();
        let hpa = |api_version: &str| {
            json!({"apiVersion": api_version, "kind": "HorizontalPodAutoscaler", "metadata": {"name": "web"}})
        };

        cluster.apply(&hpa("autoscaling/v1"), false).await.unwrap();
        cluster.apply(&hpa("autoscaling/v2"), false).await.unwrap();

        assert_eq!(cluster.objects().len(), 1);
        assert!(cluster.get(&hpa("autoscaling/v1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_all_preserves_order() {
        let cluster = MockResourceClient::new();
        cluster.apply(&config_map("b"), false).await.unwrap();

        let results = cluster.get_all(&[config_map("a"), config_map("b")]).await;
        assert!(results[0].as_ref().unwrap().is_none());
        assert_eq!(results[1].as_ref().unwrap().as_ref().unwrap()["metadata"]["name"], "b");
    }
}
