//! Kustoform Engine - Kustomize builds
//!
//! This crate turns a configuration block into built Kubernetes objects:
//! - `build`: descriptor generation in an overlay filesystem, then a build
//! - `Kustomizer`: build runner trait, backed by the `kustomize` executable
//! - `ResMap`: the built objects, in build order

pub mod build;
pub mod error;
pub mod kustomizer;
pub mod mock;
pub mod resmap;
pub mod stage;

pub use build::build;
pub use error::{EngineError, Result};
pub use kustomizer::{KUSTOMIZE_BIN_ENV, KustomizeCli, Kustomizer};
pub use mock::MockKustomizer;
pub use resmap::ResMap;
