//! Kustoform Core - Core types shared by the Kustoform crates
//!
//! This crate provides:
//! - `KustomizeModel`: the configuration block accepted by the provider
//! - `Kustomization`: the descriptor handed to `kustomize build`
//! - `OverlayFs`: a disk filesystem serving the generated descriptor from memory
//! - `Schema`: attribute declarations and validation of configuration blocks

pub mod declarations;
pub mod error;
pub mod fs;
pub mod kustomization;
pub mod model;
pub mod schema;

pub use error::{CoreError, Result};
pub use fs::{DiskFs, FileSystem, KUSTOMIZATION, MemoryFs, OverlayFs};
pub use kustomization::{Kustomization, to_kustomization};
pub use model::KustomizeModel;
pub use schema::{Attribute, AttributeKind, Schema, SchemaViolation};
