//! User settings file
//!
//! Read from `--config`, `$KUSTOFORM_CONFIG`, or
//! `<config_dir>/kustoform/config.yaml`. A missing default file is not an
//! error.

use std::path::{Path, PathBuf};

use kustoform_kube::CompressionMethod;
use kustoform_provider::ProviderConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

/// Where managed state is persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    File,
    Secrets,
}

/// Compression of states kept in Secrets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateCompression {
    None,
    Gzip,
    Zstd,
}

impl StateCompression {
    pub fn method(self) -> CompressionMethod {
        match self {
            Self::None => CompressionMethod::None,
            Self::Gzip => CompressionMethod::Gzip { level: 6 },
            Self::Zstd => CompressionMethod::Zstd { level: 3 },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    pub backend: StateBackend,
    /// Directory of the file backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Namespace of the secrets backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Secrets backend only, zstd when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<StateCompression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_history: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderConfig,
    pub state: StateSettings,
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("kustoform").join("config.yaml"))
    }

    /// Load `path`, or the default file when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::io(format!("failed to read {}", path.display()), e))?;
        let settings: Self = serde_yaml::from_str(&content).map_err(|e| {
            CliError::validation(format!("invalid settings file {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            "provider:\n  kubernetes:\n    config_context: kind-dev\nstate:\n  backend: secrets\n  namespace: kustoform\n  compression: gzip\n",
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.state.backend, StateBackend::Secrets);
        assert_eq!(settings.state.namespace.as_deref(), Some("kustoform"));
        assert_eq!(settings.state.compression, Some(StateCompression::Gzip));
        assert_eq!(
            settings.provider.kubernetes.unwrap().config_context.as_deref(),
            Some("kind-dev")
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "{}\n").unwrap();

        assert_eq!(Settings::from_file(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Settings::load(Some(Path::new("/nonexistent/kustoform.yaml"))).unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
