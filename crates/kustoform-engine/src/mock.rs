//! In-memory build runner for testing
//!
//! Returns a fixed set of objects and records every descriptor it was asked
//! to build, without spawning `kustomize`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kustoform_core::kustomization::Kustomization;
use kustoform_core::{FileSystem, KUSTOMIZATION};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::kustomizer::Kustomizer;
use crate::resmap::ResMap;

#[derive(Debug, Clone, Default)]
pub struct MockKustomizer {
    resources: Arc<Mutex<Vec<Value>>>,
    builds: Arc<Mutex<Vec<Kustomization>>>,
    roots: Arc<Mutex<Vec<PathBuf>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MockKustomizer {
    pub fn new(resources: Vec<Value>) -> Self {
        Self {
            resources: Arc::new(Mutex::new(resources)),
            ..Default::default()
        }
    }

    /// Replace the objects returned by the next builds
    pub fn set_resources(&self, resources: Vec<Value>) {
        if let Ok(mut current) = self.resources.lock() {
            *current = resources;
        }
    }

    /// Make every following build fail with `stderr`
    pub fn fail_with(&self, stderr: impl Into<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(stderr.into());
        }
    }

    /// Descriptors seen so far
    pub fn builds(&self) -> Vec<Kustomization> {
        self.builds.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Kustomization roots seen so far, resolved to absolute paths
    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Kustomizer for MockKustomizer {
    async fn run(&self, fs: &dyn FileSystem, path: &Path) -> Result<ResMap> {
        let (root, _) = fs.clean_abs(path).map_err(EngineError::staging)?;
        let content = fs
            .read_string(&root.join(KUSTOMIZATION))
            .map_err(EngineError::staging)?;
        let kustomization = Kustomization::from_yaml(&content).map_err(EngineError::staging)?;

        if let Ok(mut builds) = self.builds.lock() {
            builds.push(kustomization);
        }
        if let Ok(mut roots) = self.roots.lock() {
            roots.push(root);
        }

        if let Some(stderr) = self.failure.lock().ok().and_then(|f| f.clone()) {
            return Err(EngineError::BuildFailed {
                status: "exit status: 1".to_string(),
                stderr,
            });
        }

        let resources = self
            .resources
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default();
        Ok(ResMap::new(resources))
    }
}
