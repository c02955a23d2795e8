//! State backend selected at runtime

use async_trait::async_trait;
use kustoform_kube::{
    CompressionMethod, FileDriver, KubernetesConfig, ManagedState, SecretsDriver, StorageConfig,
    StorageDriver,
};

use crate::error::Result;
use crate::settings::{StateBackend, StateSettings};

/// Namespace of the secrets backend when none is configured
const DEFAULT_STATE_NAMESPACE: &str = "default";

pub enum StateStore {
    File(FileDriver),
    Secrets(SecretsDriver),
}

impl StateStore {
    /// Driver settings: file states are plain JSON, Secrets use the
    /// configured compression
    pub fn storage_config(settings: &StateSettings) -> StorageConfig {
        let mut config = StorageConfig::default();
        if let Some(max_history) = settings.max_history {
            config.max_history = max_history;
        }

        config.compression = match (settings.backend, settings.compression) {
            (StateBackend::File, _) => CompressionMethod::None,
            (StateBackend::Secrets, Some(compression)) => compression.method(),
            (StateBackend::Secrets, None) => CompressionMethod::default(),
        };
        config
    }

    pub async fn open(settings: &StateSettings, kubernetes: &KubernetesConfig) -> Result<Self> {
        let config = Self::storage_config(settings);

        match settings.backend {
            StateBackend::File => {
                let dir = match &settings.path {
                    Some(path) => path.clone(),
                    None => FileDriver::default_dir()?,
                };
                tracing::debug!(dir = %dir.display(), "using file state backend");
                Ok(Self::File(FileDriver::new(dir, config)?))
            }
            StateBackend::Secrets => {
                let client = kubernetes.client().await?;
                let namespace = settings
                    .namespace
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STATE_NAMESPACE.to_string());
                tracing::debug!(
                    namespace,
                    compression = config.compression.label(),
                    "using secrets state backend"
                );
                Ok(Self::Secrets(SecretsDriver::with_client(client, namespace, config)))
            }
        }
    }

    fn driver(&self) -> &dyn StorageDriver {
        match self {
            Self::File(driver) => driver,
            Self::Secrets(driver) => driver,
        }
    }
}

#[async_trait]
impl StorageDriver for StateStore {
    async fn get(
        &self,
        workspace: &str,
        name: &str,
        serial: u32,
    ) -> kustoform_kube::Result<ManagedState> {
        self.driver().get(workspace, name, serial).await
    }

    async fn get_latest(&self, workspace: &str, name: &str) -> kustoform_kube::Result<ManagedState> {
        self.driver().get_latest(workspace, name).await
    }

    async fn list(
        &self,
        workspace: Option<&str>,
        name: Option<&str>,
        include_superseded: bool,
    ) -> kustoform_kube::Result<Vec<ManagedState>> {
        self.driver().list(workspace, name, include_superseded).await
    }

    async fn history(
        &self,
        workspace: &str,
        name: &str,
    ) -> kustoform_kube::Result<Vec<ManagedState>> {
        self.driver().history(workspace, name).await
    }

    async fn create(&self, state: &ManagedState) -> kustoform_kube::Result<()> {
        self.driver().create(state).await
    }

    async fn update(&self, state: &ManagedState) -> kustoform_kube::Result<()> {
        self.driver().update(state).await
    }

    async fn delete(
        &self,
        workspace: &str,
        name: &str,
        serial: u32,
    ) -> kustoform_kube::Result<ManagedState> {
        self.driver().delete(workspace, name, serial).await
    }

    async fn delete_all(
        &self,
        workspace: &str,
        name: &str,
    ) -> kustoform_kube::Result<Vec<ManagedState>> {
        self.driver().delete_all(workspace, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::StateCompression;
    use kustoform_kube::DEFAULT_WORKSPACE;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_storage_config_compression() {
        let mut settings = StateSettings {
            compression: Some(StateCompression::Gzip),
            max_history: Some(3),
            ..Default::default()
        };
        let config = StateStore::storage_config(&settings);
        assert_eq!(config.compression, CompressionMethod::None);
        assert_eq!(config.max_history, 3);

        settings.backend = StateBackend::Secrets;
        assert_eq!(
            StateStore::storage_config(&settings).compression,
            CompressionMethod::Gzip { level: 6 }
        );

        settings.compression = None;
        assert_eq!(
            StateStore::storage_config(&settings).compression,
            CompressionMethod::Zstd { level: 3 }
        );
    }

    #[tokio::test]
    async fn test_file_backend_round_trip() {
        let temp = TempDir::new().unwrap();
        let settings = StateSettings {
            path: Some(temp.path().to_path_buf()),
            ..Default::default()
        };

        let store = StateStore::open(&settings, &KubernetesConfig::default())
            .await
            .unwrap();
        assert!(matches!(store, StateStore::File(_)));

        let state = ManagedState::new("metallb", DEFAULT_WORKSPACE, "kustomize_apply", json!({}));
        store.create(&state).await.unwrap();

        let stored = std::fs::read_to_string(temp.path().join("default/metallb/s1.json")).unwrap();
        assert!(stored.contains("\"name\": \"metallb\"") || stored.contains("\"name\":\"metallb\""));
        assert!(store.exists(DEFAULT_WORKSPACE, "metallb").await.unwrap());
    }
}
