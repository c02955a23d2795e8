//! File-based storage driver
//!
//! Layout: `<base>/<workspace>/<name>/s<serial>.json`

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{StorageConfig, StorageDriver, compress, decompress, deserialize_state, serialize_state};
use crate::error::{KubeError, Result};
use crate::state::ManagedState;

/// File-based storage driver
pub struct FileDriver {
    base_dir: PathBuf,
    config: StorageConfig,
}

impl FileDriver {
    /// Create a new file driver
    pub fn new(base_dir: PathBuf, config: StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir, config })
    }

    /// `<data_dir>/kustoform/state`
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join("kustoform").join("state"))
            .ok_or_else(|| KubeError::Storage("could not determine the data directory".to_string()))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn state_path(&self, workspace: &str, name: &str, serial: u32) -> PathBuf {
        self.state_dir(workspace, name)
            .join(format!("s{}.json", serial))
    }

    fn state_dir(&self, workspace: &str, name: &str) -> PathBuf {
        self.base_dir.join(workspace).join(name)
    }

    fn not_found(workspace: &str, name: &str) -> KubeError {
        KubeError::StateNotFound {
            name: name.to_string(),
            workspace: workspace.to_string(),
        }
    }

    fn write_state(&self, state: &ManagedState) -> Result<()> {
        let path = self.state_path(&state.workspace, &state.name, state.serial);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serialize_state(state)?;
        let data = compress(&json, self.config.compression)?;
        std::fs::write(&path, data)?;

        Ok(())
    }

    fn read_state(&self, path: &Path) -> Result<ManagedState> {
        let data = std::fs::read(path)?;
        let decompressed = decompress(&data, self.config.compression)?;
        deserialize_state(&decompressed)
    }

    fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        Ok(std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect())
    }

    fn state_files(dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect())
    }

    fn remove_if_empty(dir: &Path) -> Result<()> {
        if dir.exists() && std::fs::read_dir(dir)?.next().is_none() {
            let _ = std::fs::remove_dir(dir);
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for FileDriver {
    async fn get(&self, workspace: &str, name: &str, serial: u32) -> Result<ManagedState> {
        let path = self.state_path(workspace, name, serial);

        if !path.exists() {
            return Err(Self::not_found(workspace, name));
        }

        self.read_state(&path)
    }

    async fn get_latest(&self, workspace: &str, name: &str) -> Result<ManagedState> {
        let history = self.history(workspace, name).await?;
        history
            .into_iter()
            .next()
            .ok_or_else(|| Self::not_found(workspace, name))
    }

    async fn list(
        &self,
        workspace: Option<&str>,
        name: Option<&str>,
        include_superseded: bool,
    ) -> Result<Vec<ManagedState>> {
        let mut states = Vec::new();

        let workspaces = match workspace {
            Some(ws) => Self::subdirs(&self.base_dir)?
                .into_iter()
                .filter(|p| p.file_name().is_some_and(|n| n == ws))
                .collect(),
            None => Self::subdirs(&self.base_dir)?,
        };

        for ws_path in workspaces {
            let names: Vec<PathBuf> = match name {
                Some(n) => Self::subdirs(&ws_path)?
                    .into_iter()
                    .filter(|p| p.file_name().is_some_and(|f| f == n))
                    .collect(),
                None => Self::subdirs(&ws_path)?,
            };

            for name_path in names {
                for file in Self::state_files(&name_path)? {
                    match self.read_state(&file) {
                        Ok(state) => states.push(state),
                        Err(e) => {
                            tracing::warn!(path = %file.display(), error = %e, "skipping unreadable state file")
                        }
                    }
                }
            }
        }

        states.sort_by(|a, b| b.serial.cmp(&a.serial));

        if !include_superseded {
            let mut seen = std::collections::HashSet::new();
            states.retain(|s| seen.insert(format!("{}/{}", s.workspace, s.name)));
        }

        states.sort_by(|a, b| (&a.workspace, &a.name).cmp(&(&b.workspace, &b.name)));
        Ok(states)
    }

    async fn history(&self, workspace: &str, name: &str) -> Result<Vec<ManagedState>> {
        let dir = self.state_dir(workspace, name);

        if !dir.exists() {
            return Err(Self::not_found(workspace, name));
        }

        let mut states: Vec<ManagedState> = Self::state_files(&dir)?
            .iter()
            .filter_map(|p| self.read_state(p).ok())
            .collect();

        states.sort_by(|a, b| b.serial.cmp(&a.serial));

        if states.is_empty() {
            return Err(Self::not_found(workspace, name));
        }

        Ok(states)
    }

    async fn create(&self, state: &ManagedState) -> Result<()> {
        let path = self.state_path(&state.workspace, &state.name, state.serial);

        if path.exists() {
            return Err(KubeError::StateAlreadyExists {
                name: state.name.clone(),
                workspace: state.workspace.clone(),
                serial: state.serial,
            });
        }

        self.write_state(state)
    }

    async fn update(&self, state: &ManagedState) -> Result<()> {
        self.write_state(state)
    }

    async fn delete(&self, workspace: &str, name: &str, serial: u32) -> Result<ManagedState> {
        let path = self.state_path(workspace, name, serial);
        let state = self.get(workspace, name, serial).await?;

        std::fs::remove_file(&path)?;

        Self::remove_if_empty(&self.state_dir(workspace, name))?;
        Self::remove_if_empty(&self.base_dir.join(workspace))?;

        Ok(state)
    }

    async fn delete_all(&self, workspace: &str, name: &str) -> Result<Vec<ManagedState>> {
        let states = self.history(workspace, name).await?;
        let dir = self.state_dir(workspace, name);

        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }

        Self::remove_if_empty(&self.base_dir.join(workspace))?;

        Ok(states)
    }
}
