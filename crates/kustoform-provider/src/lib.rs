//! Kustoform Provider - the `kustomize` provider
//!
//! - `Provider`: configuration and the clients shared by everything below
//! - `BuildDataSource`: `kustomize_build`, manifests without touching a cluster
//! - `ApplyResource`: `kustomize_apply`, server-side apply of every built object
//! - `Workspace`: plan/apply/refresh/destroy of named blocks with managed state

pub mod datasource;
pub mod error;
pub mod provider;
pub mod resource;
pub mod workspace;

pub use datasource::{BuildDataSource, BuildOutput};
pub use error::{ProviderError, Result};
pub use provider::{Provider, ProviderConfig, ProviderData};
pub use resource::{
    ApplyConfig, ApplyResource, ApplyState, DeleteReport, ReadOutcome, UpdateOutcome,
};
pub use workspace::{Applied, DEFAULT_MAX_HISTORY, Plan, PlanAction, Refreshed, Workspace};
