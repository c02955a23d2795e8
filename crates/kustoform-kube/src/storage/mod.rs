//! Storage drivers for persisting managed state
//!
//! - **File** (default): JSON documents under the local data directory
//! - **Secrets**: Kubernetes Secrets in a dedicated namespace
//! - **Mock**: in-memory, for tests
//!
//! Every serial is stored as compressed JSON. The previous serial is marked
//! superseded when a new one is written, and history beyond
//! [`StorageConfig::max_history`] is pruned.

mod file;
mod mock;
mod secrets;

pub use file::FileDriver;
pub use mock::{MockStorageDriver, OperationCounts};
pub use secrets::SecretsDriver;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{KubeError, Result};
use crate::state::ManagedState;

/// Largest encoded state a Secret may hold
pub const MAX_RESOURCE_SIZE: usize = 1_000_000;

/// Storage driver trait for state persistence
///
/// States are keyed by workspace, name and serial.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Get a specific serial
    async fn get(&self, workspace: &str, name: &str, serial: u32) -> Result<ManagedState>;

    /// Get the latest serial for a name
    async fn get_latest(&self, workspace: &str, name: &str) -> Result<ManagedState>;

    /// List latest states, optionally filtered by workspace and/or name
    async fn list(
        &self,
        workspace: Option<&str>,
        name: Option<&str>,
        include_superseded: bool,
    ) -> Result<Vec<ManagedState>>;

    /// All serials for a name, newest first
    async fn history(&self, workspace: &str, name: &str) -> Result<Vec<ManagedState>>;

    /// Store a new serial
    async fn create(&self, state: &ManagedState) -> Result<()>;

    /// Overwrite an existing serial
    async fn update(&self, state: &ManagedState) -> Result<()>;

    /// Delete a specific serial
    async fn delete(&self, workspace: &str, name: &str, serial: u32) -> Result<ManagedState>;

    /// Delete every serial of a name
    async fn delete_all(&self, workspace: &str, name: &str) -> Result<Vec<ManagedState>>;

    /// Check if a state exists
    async fn exists(&self, workspace: &str, name: &str) -> Result<bool> {
        match self.get_latest(workspace, name).await {
            Ok(_) => Ok(true),
            Err(KubeError::StateNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Delete serials beyond `max_history`, oldest first
pub async fn prune_history<S: StorageDriver + ?Sized>(
    storage: &S,
    workspace: &str,
    name: &str,
    max_history: u32,
) -> Result<usize> {
    let history = storage.history(workspace, name).await?;
    let mut pruned = 0;

    for state in history.iter().skip(max_history as usize) {
        storage.delete(workspace, name, state.serial).await?;
        pruned += 1;
    }

    if pruned > 0 {
        tracing::debug!(workspace, name, pruned, "pruned state history");
    }
    Ok(pruned)
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Compression method
    pub compression: CompressionMethod,

    /// Maximum number of serials to keep per state
    pub max_history: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Zstd { level: 3 },
            max_history: 10,
        }
    }
}

/// Compression method for state data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression
    None,

    /// Gzip compression
    Gzip { level: u32 },

    /// Zstd compression
    Zstd { level: i32 },
}

impl Default for CompressionMethod {
    fn default() -> Self {
        Self::Zstd { level: 3 }
    }
}

impl CompressionMethod {
    /// Label value recorded next to stored data
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip { .. } => "gzip",
            Self::Zstd { .. } => "zstd",
        }
    }

    /// Inverse of [`CompressionMethod::label`]; levels only matter when writing
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "none" => Some(Self::None),
            "gzip" => Some(Self::Gzip { level: 6 }),
            "zstd" => Some(Self::Zstd { level: 3 }),
            _ => None,
        }
    }
}

/// Compress `data` with `method`
pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { level } => {
            use std::io::Write;
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(level));
            encoder
                .write_all(data)
                .map_err(|e| KubeError::Compression(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| KubeError::Compression(e.to_string()))
        }
        CompressionMethod::Zstd { level } => zstd::encode_all(std::io::Cursor::new(data), level)
            .map_err(|e| KubeError::Compression(e.to_string())),
    }
}

/// Decompress data
pub fn decompress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { .. } => {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| KubeError::Compression(e.to_string()))?;
            Ok(decompressed)
        }
        CompressionMethod::Zstd { .. } => zstd::decode_all(std::io::Cursor::new(data))
            .map_err(|e| KubeError::Compression(e.to_string())),
    }
}

/// Serialize a state to JSON bytes
pub fn serialize_state(state: &ManagedState) -> Result<Vec<u8>> {
    serde_json::to_vec(state).map_err(|e| KubeError::Serialization(e.to_string()))
}

/// Deserialize a state from JSON bytes
pub fn deserialize_state(data: &[u8]) -> Result<ManagedState> {
    serde_json::from_slice(data).map_err(|e| KubeError::Serialization(e.to_string()))
}

/// JSON, then compression, then base64
pub fn encode_for_storage(state: &ManagedState, config: &StorageConfig) -> Result<String> {
    let json = serialize_state(state)?;
    let compressed = compress(&json, config.compression)?;
    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        &compressed,
    ))
}

/// Inverse of [`encode_for_storage`]
pub fn decode_from_storage(data: &str, compression: CompressionMethod) -> Result<ManagedState> {
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data)
        .map_err(|e| KubeError::Serialization(format!("base64 decode error: {}", e)))?;
    let decompressed = decompress(&decoded, compression)?;
    deserialize_state(&decompressed)
}

/// Labels put on every Secret written by the Secrets driver
#[must_use = "labels should be applied to resources"]
pub fn storage_labels(state: &ManagedState) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "kustoform".to_string(),
    );
    labels.insert("kustoform.io/state-name".to_string(), state.name.clone());
    labels.insert(
        "kustoform.io/state-serial".to_string(),
        state.serial.to_string(),
    );
    labels.insert(
        "kustoform.io/workspace".to_string(),
        state.workspace.clone(),
    );
    labels
}
