//! CLI commands

pub mod build;
pub mod kustomization;
pub mod schema;

// Managed state
pub mod apply;
pub mod destroy;
pub mod list;
pub mod plan;
pub mod refresh;
pub mod show;
