//! Engine error types

use kustoform_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("Failed to prepare the overlay filesystem: {0}")]
    #[diagnostic(code(kustoform::engine::overlay))]
    Overlay(#[source] CoreError),

    #[error("Failed to write kustomization.yaml to the overlay filesystem: {0}")]
    #[diagnostic(code(kustoform::engine::overlay_write))]
    OverlayWrite(#[source] CoreError),

    #[error("Failed to marshal the kustomization: {0}")]
    #[diagnostic(code(kustoform::engine::marshal))]
    Marshal(#[source] serde_yaml::Error),

    #[error("Failed to stage the kustomization: {message}")]
    #[diagnostic(code(kustoform::engine::staging))]
    Staging { message: String },

    #[error("kustomize executable not found: {binary}")]
    #[diagnostic(
        code(kustoform::engine::not_found),
        help("Install kustomize or point KUSTOMIZE_BIN at the binary")
    )]
    KustomizeNotFound { binary: String },

    #[error("kustomize build failed ({status}): {stderr}")]
    #[diagnostic(code(kustoform::engine::build))]
    BuildFailed { status: String, stderr: String },

    #[error("kustomize build produced invalid output: {message}")]
    #[diagnostic(code(kustoform::engine::output))]
    InvalidOutput { message: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(kustoform::engine::io))]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn staging(message: impl std::fmt::Display) -> Self {
        Self::Staging {
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
