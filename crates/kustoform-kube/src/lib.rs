//! Kustoform Kube - Kubernetes integration for Kustoform
//!
//! This crate provides:
//! - **Cluster connection**: resolve the provider `kubernetes` block into a client
//! - **Dynamic apply**: server-side apply, fetch and delete of untyped objects
//! - **Managed state**: what was applied, with pluggable storage drivers
//! - **Diff engine**: compare stored manifests with a new build

pub mod config;
pub mod diff;
pub mod error;
pub mod resources;
pub mod state;
pub mod storage;

pub use config::{KUBE_CONFIG_PATHS_ENV, KubernetesConfig, default_server_url};
pub use diff::{ChangeType, DiffEngine, DiffResult, ResourceChange};
pub use error::{KubeError, Result};
pub use resources::{
    DeleteOutcome, FIELD_MANAGER, MockResourceClient, ObjectIdentity, ObjectRef, ResourceCall,
    ResourceClient, ResourceManager,
};
pub use state::{DEFAULT_WORKSPACE, ManagedState, StateStatus, manifest_id, validate_name};
pub use storage::{
    CompressionMethod, FileDriver, MockStorageDriver, OperationCounts, SecretsDriver,
    StorageConfig, StorageDriver, prune_history,
};
