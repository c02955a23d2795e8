//! Kubernetes Secrets storage driver
//!
//! Every serial lives in its own Secret, all of them in one namespace. The
//! workspace and state name are carried as labels so listing is a label
//! query.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use std::collections::BTreeMap;

use super::{
    CompressionMethod, MAX_RESOURCE_SIZE, StorageConfig, StorageDriver, decode_from_storage,
    encode_for_storage, storage_labels,
};
use crate::error::{KubeError, Result};
use crate::state::{ManagedState, storage_key};

/// Namespace holding state Secrets unless configured otherwise
pub const DEFAULT_STATE_NAMESPACE: &str = "default";

const SECRET_TYPE: &str = "kustoform.io/state.v1";
const DATA_KEY: &str = "state";
const COMPRESSION_LABEL: &str = "kustoform.io/compression";

/// Kubernetes Secrets storage driver
pub struct SecretsDriver {
    client: Client,
    namespace: String,
    config: StorageConfig,
}

impl SecretsDriver {
    /// Create with an inferred client
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::with_client(client, DEFAULT_STATE_NAMESPACE, config))
    }

    /// Create with an existing client
    pub fn with_client(client: Client, namespace: impl Into<String>, config: StorageConfig) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            config,
        }
    }

    fn api(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn not_found(workspace: &str, name: &str) -> KubeError {
        KubeError::StateNotFound {
            name: name.to_string(),
            workspace: workspace.to_string(),
        }
    }

    fn build_secret(&self, state: &ManagedState) -> Result<Secret> {
        let encoded = encode_for_storage(state, &self.config)?;
        if encoded.len() > MAX_RESOURCE_SIZE {
            return Err(KubeError::StateTooLarge {
                size: encoded.len(),
                max: MAX_RESOURCE_SIZE,
            });
        }

        let mut labels = storage_labels(state);
        labels.insert(
            "kustoform.io/storage-driver".to_string(),
            "secrets".to_string(),
        );
        labels.insert(
            COMPRESSION_LABEL.to_string(),
            self.config.compression.label().to_string(),
        );

        let mut data = BTreeMap::new();
        data.insert(
            DATA_KEY.to_string(),
            k8s_openapi::ByteString(encoded.into_bytes()),
        );

        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(state.storage_key()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            type_: Some(SECRET_TYPE.to_string()),
            data: Some(data),
            ..Default::default()
        })
    }

    fn parse_secret(&self, secret: &Secret) -> Result<ManagedState> {
        let data = secret
            .data
            .as_ref()
            .and_then(|d| d.get(DATA_KEY))
            .ok_or_else(|| KubeError::Storage(format!("Secret missing '{}' data", DATA_KEY)))?;

        let encoded = String::from_utf8(data.0.clone())
            .map_err(|e| KubeError::Storage(format!("Invalid UTF-8 in secret: {}", e)))?;

        decode_from_storage(&encoded, self.compression_of(secret))
    }

    fn compression_of(&self, secret: &Secret) -> CompressionMethod {
        secret
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(COMPRESSION_LABEL))
            .and_then(|c| CompressionMethod::from_label(c))
            .unwrap_or(self.config.compression)
    }

    async fn query(&self, workspace: Option<&str>, name: Option<&str>) -> Result<Vec<ManagedState>> {
        let mut selector = "app.kubernetes.io/managed-by=kustoform".to_string();
        if let Some(ws) = workspace {
            selector.push_str(&format!(",kustoform.io/workspace={}", ws));
        }
        if let Some(n) = name {
            selector.push_str(&format!(",kustoform.io/state-name={}", n));
        }

        let secrets = self
            .api()
            .list(&ListParams::default().labels(&selector))
            .await?;

        let mut states = Vec::with_capacity(secrets.items.len());
        for secret in &secrets.items {
            match self.parse_secret(secret) {
                Ok(state) => states.push(state),
                Err(e) => tracing::warn!(
                    secret = secret.metadata.name.as_deref().unwrap_or_default(),
                    error = %e,
                    "skipping unreadable state secret"
                ),
            }
        }

        states.sort_by(|a, b| b.serial.cmp(&a.serial));
        Ok(states)
    }
}

#[async_trait]
impl StorageDriver for SecretsDriver {
    async fn get(&self, workspace: &str, name: &str, serial: u32) -> Result<ManagedState> {
        match self.api().get(&storage_key(workspace, name, serial)).await {
            Ok(secret) => self.parse_secret(&secret),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(Self::not_found(workspace, name)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_latest(&self, workspace: &str, name: &str) -> Result<ManagedState> {
        let history = self.history(workspace, name).await?;
        history
            .into_iter()
            .next()
            .ok_or_else(|| Self::not_found(workspace, name))
    }

    async fn list(
        &self,
        workspace: Option<&str>,
        name: Option<&str>,
        include_superseded: bool,
    ) -> Result<Vec<ManagedState>> {
        let mut states = self.query(workspace, name).await?;

        if !include_superseded {
            let mut seen = std::collections::HashSet::new();
            states.retain(|s| seen.insert(format!("{}/{}", s.workspace, s.name)));
        }

        states.sort_by(|a, b| (&a.workspace, &a.name).cmp(&(&b.workspace, &b.name)));
        Ok(states)
    }

    async fn history(&self, workspace: &str, name: &str) -> Result<Vec<ManagedState>> {
        let states = self.query(Some(workspace), Some(name)).await?;

        if states.is_empty() {
            return Err(Self::not_found(workspace, name));
        }
        Ok(states)
    }

    async fn create(&self, state: &ManagedState) -> Result<()> {
        let secret = self.build_secret(state)?;

        match self.api().create(&PostParams::default(), &secret).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(KubeError::StateAlreadyExists {
                name: state.name.clone(),
                workspace: state.workspace.clone(),
                serial: state.serial,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, state: &ManagedState) -> Result<()> {
        let api = self.api();
        let key = state.storage_key();
        let mut secret = self.build_secret(state)?;

        match api.get(&key).await {
            Ok(existing) => {
                secret.metadata.resource_version = existing.metadata.resource_version;
                api.replace(&key, &PostParams::default(), &secret).await?;
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                api.create(&PostParams::default(), &secret).await?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    async fn delete(&self, workspace: &str, name: &str, serial: u32) -> Result<ManagedState> {
        let state = self.get(workspace, name, serial).await?;

        match self
            .api()
            .delete(&state.storage_key(), &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(state),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(state),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self, workspace: &str, name: &str) -> Result<Vec<ManagedState>> {
        let states = self.history(workspace, name).await?;
        let api = self.api();

        for state in &states {
            match api.delete(&state.storage_key(), &DeleteParams::default()).await {
                Ok(_) => {}
                Err(kube::Error::Api(e)) if e.code == 404 => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(states)
    }
}
