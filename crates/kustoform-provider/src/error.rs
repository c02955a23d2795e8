//! Provider error types
//!
//! Operation failures carry a short summary of the step that failed and the
//! underlying detail, the way diagnostics are reported to users.

use kustoform_core::SchemaViolation;
use kustoform_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

pub const BUILD_FAILED: &str = "Failed to run kustomize build";
pub const YAML_FAILED: &str = "Failed to convert generated manifests to YAML";
pub const CLIENT_FAILED: &str = "Failed to create Kubernetes client";
pub const REST_CLIENT_FAILED: &str = "Failed to create rest client from resource";
pub const CREATE_FAILED: &str = "Failed to create object";
pub const UPDATE_FAILED: &str = "Failed to update object";
pub const GET_FAILED: &str = "Failed to get object";
pub const DELETE_FAILED: &str = "Failed to delete Kubernetes object";
pub const STATE_OBJECTS_FAILED: &str = "Failed to read objects from state";

#[derive(Error, Debug, Diagnostic)]
pub enum ProviderError {
    #[error("Invalid configuration block:\n{}", format_violations(.violations))]
    #[diagnostic(
        code(kustoform::provider::invalid_config),
        help("Run `kustoform schema` to list the supported attributes")
    )]
    InvalidConfig { violations: Vec<SchemaViolation> },

    #[error("Invalid configuration block: {message}")]
    #[diagnostic(code(kustoform::provider::decode))]
    Decode { message: String },

    #[error("{summary}: {detail}")]
    #[diagnostic(code(kustoform::provider::operation))]
    Operation { summary: &'static str, detail: String },

    #[error("Kubernetes is not configured")]
    #[diagnostic(
        code(kustoform::provider::no_cluster),
        help("Add a `kubernetes` block to the provider settings or pass --kubeconfig")
    )]
    NotConfigured,

    #[error("Managed state error: {0}")]
    #[diagnostic(code(kustoform::provider::state))]
    State(#[from] KubeError),
}

impl ProviderError {
    pub fn operation(summary: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Operation {
            summary,
            detail: detail.to_string(),
        }
    }

    /// Object level failures; objects the server cannot route are reported
    /// as a client creation failure whatever the operation
    pub(crate) fn object(summary: &'static str, err: KubeError) -> Self {
        match err {
            KubeError::UnsupportedResource { .. } | KubeError::InvalidManifest(_) => {
                Self::operation(REST_CLIENT_FAILED, err)
            }
            other => Self::operation(summary, other),
        }
    }

    /// Short summary of what failed
    pub fn summary(&self) -> &str {
        match self {
            Self::InvalidConfig { .. } | Self::Decode { .. } => "Invalid configuration block",
            Self::Operation { summary, .. } => summary,
            Self::NotConfigured => "Kubernetes is not configured",
            Self::State(_) => "Managed state error",
        }
    }
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, ProviderError>;
