//! Error types for kustoform-kube

use thiserror::Error;

/// Result type for kustoform-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes and state operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// No state stored under this name
    #[error("state '{name}' not found in workspace '{workspace}'")]
    StateNotFound { name: String, workspace: String },

    /// State serial already taken
    #[error("state '{name}' serial {serial} already exists in workspace '{workspace}'")]
    StateAlreadyExists {
        name: String,
        workspace: String,
        serial: u32,
    },

    /// State name unusable as a storage key
    #[error("invalid state name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Encoded state exceeds what the backend can hold
    #[error("state data too large ({size} bytes, max {max} bytes)\nHint: Use the file state backend for very large configurations")]
    StateTooLarge { size: usize, max: usize },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Compression error
    #[error("compression error: {0}")]
    Compression(String),

    /// Kubeconfig could not be loaded or resolved
    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    /// `host` is not a usable server URL
    #[error("failed to parse host: {0}")]
    HostParse(String),

    /// Kind not advertised by the API server
    #[error("the Kubernetes API server doesn't support this resource: {api_version}/{kind}")]
    UnsupportedResource { api_version: String, kind: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<kube::config::KubeconfigError> for KubeError {
    fn from(e: kube::config::KubeconfigError) -> Self {
        KubeError::Kubeconfig(e.to_string())
    }
}

impl From<kube::config::InferConfigError> for KubeError {
    fn from(e: kube::config::InferConfigError) -> Self {
        KubeError::Kubeconfig(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> KubeError {
        KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_status_helpers() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(404).is_conflict());
        assert!(api_error(409).is_conflict());
        assert!(!KubeError::Storage("x".to_string()).is_not_found());
    }

    #[test]
    fn test_unsupported_resource_message() {
        let err = KubeError::UnsupportedResource {
            api_version: "example.com/v1".to_string(),
            kind: "Widget".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "the Kubernetes API server doesn't support this resource: example.com/v1/Widget"
        );
    }
}
