//! Mock storage driver for testing
//!
//! Keeps every serial in memory and counts operations so tests can assert
//! on storage traffic without a cluster or a data directory.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::StorageDriver;
use crate::error::{KubeError, Result};
use crate::state::ManagedState;

/// workspace -> name -> serial -> state
type Store = HashMap<String, HashMap<String, BTreeMap<u32, ManagedState>>>;

/// In-memory storage driver for testing
#[derive(Clone, Default)]
pub struct MockStorageDriver {
    store: Arc<RwLock<Store>>,
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl MockStorageDriver {
    /// Create a new empty mock driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated states
    pub fn with_states(states: Vec<ManagedState>) -> Self {
        let driver = Self::new();
        if let Ok(mut store) = driver.store.write() {
            for state in states {
                store
                    .entry(state.workspace.clone())
                    .or_default()
                    .entry(state.name.clone())
                    .or_default()
                    .insert(state.serial, state);
            }
        }
        driver
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        if let Ok(mut ops) = self.operations.write() {
            *ops = OperationCounts::default();
        }
    }

    /// Every stored serial
    pub fn all_states(&self) -> Vec<ManagedState> {
        self.read()
            .map(|store| {
                store
                    .values()
                    .flat_map(|ws| ws.values())
                    .flat_map(|serials| serials.values())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Count stored serials
    pub fn state_count(&self) -> usize {
        self.all_states().len()
    }

    fn count(&self, op: impl FnOnce(&mut OperationCounts)) {
        if let Ok(mut ops) = self.operations.write() {
            op(&mut ops);
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Store>> {
        self.store
            .read()
            .map_err(|e| KubeError::Storage(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Store>> {
        self.store
            .write()
            .map_err(|e| KubeError::Storage(e.to_string()))
    }

    fn not_found(workspace: &str, name: &str) -> KubeError {
        KubeError::StateNotFound {
            name: name.to_string(),
            workspace: workspace.to_string(),
        }
    }
}

#[async_trait]
impl StorageDriver for MockStorageDriver {
    async fn get(&self, workspace: &str, name: &str, serial: u32) -> Result<ManagedState> {
        self.count(|ops| ops.gets += 1);

        self.read()?
            .get(workspace)
            .and_then(|ws| ws.get(name))
            .and_then(|serials| serials.get(&serial))
            .cloned()
            .ok_or_else(|| Self::not_found(workspace, name))
    }

    async fn get_latest(&self, workspace: &str, name: &str) -> Result<ManagedState> {
        self.count(|ops| ops.gets += 1);

        self.read()?
            .get(workspace)
            .and_then(|ws| ws.get(name))
            .and_then(|serials| serials.values().next_back())
            .cloned()
            .ok_or_else(|| Self::not_found(workspace, name))
    }

    async fn list(
        &self,
        workspace: Option<&str>,
        name: Option<&str>,
        include_superseded: bool,
    ) -> Result<Vec<ManagedState>> {
        self.count(|ops| ops.lists += 1);

        let store = self.read()?;
        let mut states: Vec<ManagedState> = store
            .iter()
            .filter(|(ws, _)| workspace.is_none_or(|w| w == *ws))
            .flat_map(|(_, names)| names.iter())
            .filter(|(n, _)| name.is_none_or(|filter| filter == *n))
            .flat_map(|(_, serials)| {
                let serials = serials.values().rev();
                if include_superseded {
                    serials.cloned().collect::<Vec<_>>()
                } else {
                    serials.take(1).cloned().collect()
                }
            })
            .collect();

        states.sort_by(|a, b| {
            (&a.workspace, &a.name, b.serial).cmp(&(&b.workspace, &b.name, a.serial))
        });
        Ok(states)
    }

    async fn history(&self, workspace: &str, name: &str) -> Result<Vec<ManagedState>> {
        self.count(|ops| ops.lists += 1);

        let states: Vec<ManagedState> = self
            .read()?
            .get(workspace)
            .and_then(|ws| ws.get(name))
            .map(|serials| serials.values().rev().cloned().collect())
            .unwrap_or_default();

        if states.is_empty() {
            return Err(Self::not_found(workspace, name));
        }

        Ok(states)
    }

    async fn create(&self, state: &ManagedState) -> Result<()> {
        self.count(|ops| ops.creates += 1);

        let mut store = self.write()?;
        let serials = store
            .entry(state.workspace.clone())
            .or_default()
            .entry(state.name.clone())
            .or_default();

        if serials.contains_key(&state.serial) {
            return Err(KubeError::StateAlreadyExists {
                name: state.name.clone(),
                workspace: state.workspace.clone(),
                serial: state.serial,
            });
        }

        serials.insert(state.serial, state.clone());
        Ok(())
    }

    async fn update(&self, state: &ManagedState) -> Result<()> {
        self.count(|ops| ops.updates += 1);

        self.write()?
            .entry(state.workspace.clone())
            .or_default()
            .entry(state.name.clone())
            .or_default()
            .insert(state.serial, state.clone());
        Ok(())
    }

    async fn delete(&self, workspace: &str, name: &str, serial: u32) -> Result<ManagedState> {
        self.count(|ops| ops.deletes += 1);

        let mut store = self.write()?;
        let names = store
            .get_mut(workspace)
            .ok_or_else(|| Self::not_found(workspace, name))?;
        let serials = names
            .get_mut(name)
            .ok_or_else(|| Self::not_found(workspace, name))?;
        let state = serials
            .remove(&serial)
            .ok_or_else(|| Self::not_found(workspace, name))?;

        if serials.is_empty() {
            names.remove(name);
        }
        Ok(state)
    }

    async fn delete_all(&self, workspace: &str, name: &str) -> Result<Vec<ManagedState>> {
        self.count(|ops| ops.deletes += 1);

        let removed = self
            .write()?
            .get_mut(workspace)
            .and_then(|ws| ws.remove(name))
            .map(|serials| serials.into_values().rev().collect::<Vec<_>>())
            .unwrap_or_default();

        if removed.is_empty() {
            return Err(Self::not_found(workspace, name));
        }
        Ok(removed)
    }
}
