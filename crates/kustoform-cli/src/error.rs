//! CLI error type with exit code handling

use kustoform_kube::KubeError;
use kustoform_provider::ProviderError;
use kustoform_provider::error::{BUILD_FAILED, YAML_FAILED};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid configuration block, settings or arguments
    #[error("{message}")]
    #[diagnostic(code(kustoform::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(kustoform::cli::build))]
    Build {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(kustoform::cli::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(kustoform::cli::state))]
    State {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("IO error: {message}")]
    #[diagnostic(code(kustoform::cli::io))]
    Io { message: String },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Build { .. } => exit_codes::BUILD_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::State { .. } => exit_codes::STATE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: None,
        }
    }

    pub fn validation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{}: {}", context, err),
        }
    }
}

/// Help attached by the underlying diagnostic, if any
fn help_of(err: &dyn Diagnostic) -> Option<String> {
    err.help().map(|h| h.to_string())
}

impl From<ProviderError> for CliError {
    fn from(err: ProviderError) -> Self {
        let message = err.to_string();
        let help = help_of(&err);

        match &err {
            ProviderError::InvalidConfig { .. } | ProviderError::Decode { .. } => {
                Self::Validation { message, help }
            }
            ProviderError::Operation { summary, .. }
                if *summary == BUILD_FAILED || *summary == YAML_FAILED =>
            {
                Self::Build {
                    message,
                    help: help.or_else(|| {
                        Some("Run `kustoform kustomization -f <block>` to inspect the generated descriptor".to_string())
                    }),
                }
            }
            ProviderError::Operation { .. } | ProviderError::NotConfigured => {
                Self::Cluster { message, help }
            }
            ProviderError::State(KubeError::StateNotFound { .. }) => Self::State {
                message,
                help: Some("Run `kustoform list` to see the managed states".to_string()),
            },
            ProviderError::State(KubeError::InvalidName { .. }) => {
                Self::Validation { message, help }
            }
            ProviderError::State(_) => Self::State { message, help },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        ProviderError::from(err).into()
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
