//! Dynamic object operations against the API server
//!
//! Objects are handled as untyped JSON. Each object's `apiVersion`/`kind` is
//! resolved against the group version the server advertises for it, so a
//! broken aggregated API elsewhere in the cluster does not block unrelated
//! objects.

mod mock;

pub use mock::{MockResourceClient, ResourceCall};

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PropagationPolicy},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Scope},
};
use serde_json::Value;

use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "kustoform";

/// Namespace used for namespaced objects that do not set one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn from_value(object: &Value) -> Result<Self> {
        let field = |path: &[&str]| {
            path.iter()
                .try_fold(object, |v, key| v.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let missing = |what: &str| KubeError::InvalidManifest(format!("object is missing {}", what));

        Ok(Self {
            api_version: field(&["apiVersion"]).ok_or_else(|| missing("apiVersion"))?,
            kind: field(&["kind"]).ok_or_else(|| missing("kind"))?,
            namespace: field(&["metadata", "namespace"]),
            name: field(&["metadata", "name"]).ok_or_else(|| missing("metadata.name"))?,
        })
    }

    /// Identity across API versions of the same group
    pub fn identity(&self) -> ObjectIdentity {
        ObjectIdentity {
            group: self.gvk().group,
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = match self.api_version.rsplit_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), self.api_version.clone()),
        };

        GroupVersionKind {
            group,
            version,
            kind: self.kind.clone(),
        }
    }
}

/// An object as the API server sees it: served versions of one group are
/// views of the same object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentity {
    pub group: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Result of deleting a single object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

/// Object operations used by the apply resource
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Server-side apply `object`, returning what the server stored
    async fn apply(&self, object: &Value, force: bool) -> Result<Value>;

    /// Fetch the live object, `None` if it does not exist
    async fn get(&self, object: &Value) -> Result<Option<Value>>;

    /// Delete with background propagation
    async fn delete(&self, object: &Value) -> Result<DeleteOutcome>;

    /// Fetch several objects concurrently, results in input order
    async fn get_all(&self, objects: &[Value]) -> Vec<Result<Option<Value>>> {
        futures::future::join_all(objects.iter().map(|o| self.get(o))).await
    }
}

/// Object resolved against discovery
struct Resolved {
    reference: ObjectRef,
    api_resource: ApiResource,
    capabilities: ApiCapabilities,
}

/// [`ResourceClient`] backed by a live cluster
pub struct ResourceManager {
    client: Client,
    resolved: Mutex<HashMap<GroupVersionKind, (ApiResource, ApiCapabilities)>>,
}

impl ResourceManager {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn resolve(&self, object: &Value) -> Result<Resolved> {
        let reference = ObjectRef::from_value(object)?;
        let gvk = reference.gvk();

        let cached = self
            .resolved
            .lock()
            .ok()
            .and_then(|cache| cache.get(&gvk).cloned());

        let (api_resource, capabilities) = match cached {
            Some(found) => found,
            None => {
                let found = kube::discovery::pinned_kind(&self.client, &gvk)
                    .await
                    .map_err(|e| match e {
                        kube::Error::Discovery(_) => unsupported(&reference),
                        kube::Error::Api(resp) if resp.code == 404 => unsupported(&reference),
                        other => KubeError::Api(other),
                    })?;
                if let Ok(mut cache) = self.resolved.lock() {
                    cache.insert(gvk, found.clone());
                }
                found
            }
        };

        Ok(Resolved {
            reference,
            api_resource,
            capabilities,
        })
    }

    fn api_for(&self, resolved: &Resolved) -> Api<DynamicObject> {
        if resolved.capabilities.scope == Scope::Namespaced {
            let ns = resolved
                .reference
                .namespace
                .as_deref()
                .unwrap_or(DEFAULT_NAMESPACE);
            Api::namespaced_with(self.client.clone(), ns, &resolved.api_resource)
        } else {
            Api::all_with(self.client.clone(), &resolved.api_resource)
        }
    }
}

fn unsupported(reference: &ObjectRef) -> KubeError {
    KubeError::UnsupportedResource {
        api_version: reference.api_version.clone(),
        kind: reference.kind.clone(),
    }
}

#[async_trait]
impl ResourceClient for ResourceManager {
    #[tracing::instrument(skip_all, fields(object = tracing::field::Empty))]
    async fn apply(&self, object: &Value, force: bool) -> Result<Value> {
        let resolved = self.resolve(object).await?;
        tracing::Span::current().record("object", tracing::field::display(&resolved.reference));

        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = force;

        let applied = self
            .api_for(&resolved)
            .patch(&resolved.reference.name, &params, &Patch::Apply(object))
            .await?;

        tracing::debug!("applied");
        Ok(serde_json::to_value(applied)?)
    }

    async fn get(&self, object: &Value) -> Result<Option<Value>> {
        let resolved = self.resolve(object).await?;

        match self.api_for(&resolved).get_opt(&resolved.reference.name).await? {
            Some(live) => Ok(Some(serde_json::to_value(live)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, object: &Value) -> Result<DeleteOutcome> {
        let resolved = self.resolve(object).await?;

        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };

        match self
            .api_for(&resolved)
            .delete(&resolved.reference.name, &params)
            .await
        {
            Ok(_) => {
                tracing::debug!(object = %resolved.reference, "deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(DeleteOutcome::AlreadyAbsent),
            Err(e) => Err(KubeError::Api(e)),
        }
    }
}
