//! Managed state: what was applied for a named configuration

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{KubeError, Result};

/// Workspace used when none is given
pub const DEFAULT_WORKSPACE: &str = "default";

/// Longest accepted state or workspace name
const MAX_NAME_LEN: usize = 53;

/// One serial of the persisted record for a named configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedState {
    /// State name
    pub name: String,

    /// Workspace grouping related states
    pub workspace: String,

    /// Serial number (1-indexed, increments with every persisted change)
    pub serial: u32,

    /// Current status
    pub state: StateStatus,

    /// Declaration the state belongs to (`kustomize_apply`, `kustomize_build`)
    pub resource_type: String,

    /// Attribute values of the configuration block
    pub config: Value,

    /// Hex SHA-256 of `yaml`
    #[serde(default)]
    pub id: String,

    /// Built manifests
    #[serde(default)]
    pub yaml: String,

    /// Objects returned by the API server, one JSON document each, build order
    #[serde(default)]
    pub objects: Vec<String>,

    /// Absolute directory the block was built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ManagedState {
    /// First serial of a new state
    pub fn new(
        name: impl Into<String>,
        workspace: impl Into<String>,
        resource_type: impl Into<String>,
        config: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            workspace: workspace.into(),
            serial: 1,
            state: StateStatus::Pending { started_at: now },
            resource_type: resource_type.into(),
            config,
            id: String::new(),
            yaml: String::new(),
            objects: Vec::new(),
            workdir: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Following serial, carrying over what was applied so far
    pub fn next(previous: &ManagedState, config: Value) -> Self {
        let now = Utc::now();
        Self {
            name: previous.name.clone(),
            workspace: previous.workspace.clone(),
            serial: previous.serial + 1,
            state: StateStatus::Pending { started_at: now },
            resource_type: previous.resource_type.clone(),
            config,
            id: previous.id.clone(),
            yaml: previous.yaml.clone(),
            objects: previous.objects.clone(),
            workdir: previous.workdir.clone(),
            created_at: previous.created_at,
            updated_at: now,
        }
    }

    /// Storage key for this serial
    pub fn storage_key(&self) -> String {
        storage_key(&self.workspace, &self.name, self.serial)
    }

    /// Record built manifests and the id derived from them
    pub fn set_yaml(&mut self, yaml: String) {
        self.id = manifest_id(&yaml);
        self.yaml = yaml;
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.state, StateStatus::Applied)
    }

    /// Mark the state as applied
    pub fn mark_applied(&mut self) {
        self.state = StateStatus::Applied;
        self.updated_at = Utc::now();
    }

    /// Mark the state as failed
    pub fn mark_failed(&mut self, reason: String) {
        self.state = StateStatus::Failed {
            reason,
            failed_at: Utc::now(),
        };
        self.updated_at = Utc::now();
    }

    /// Mark the state as superseded (replaced by a newer serial)
    pub fn mark_superseded(&mut self) {
        self.state = StateStatus::Superseded;
        self.updated_at = Utc::now();
    }

    /// Parse the recorded objects
    pub fn parsed_objects(&self) -> Result<Vec<Value>> {
        self.objects
            .iter()
            .map(|o| serde_json::from_str(o).map_err(KubeError::from))
            .collect()
    }
}

/// Status of a state serial
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "kebab-case")]
#[non_exhaustive]
pub enum StateStatus {
    /// Operation in progress
    Pending { started_at: DateTime<Utc> },

    /// Objects applied and recorded
    Applied,

    /// Operation failed
    Failed {
        reason: String,
        failed_at: DateTime<Utc>,
    },

    /// Replaced by a newer serial
    Superseded,
}

impl StateStatus {
    /// Human-readable status name
    pub fn status_name(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Applied => "applied",
            Self::Failed { .. } => "failed",
            Self::Superseded => "superseded",
        }
    }
}

impl std::fmt::Display for StateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { reason, .. } => write!(f, "failed: {}", reason),
            other => write!(f, "{}", other.status_name()),
        }
    }
}

/// Storage key for a serial of `name` in `workspace`
pub fn storage_key(workspace: &str, name: &str, serial: u32) -> String {
    format!("kf.state.v1.{}.{}.s{}", workspace, name, serial)
}

/// Hex SHA-256 of the built manifests
pub fn manifest_id(yaml: &str) -> String {
    hex::encode(Sha256::digest(yaml.as_bytes()))
}

/// State and workspace names end up in file paths, Secret names and labels,
/// so they are restricted to lowercase DNS labels
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| KubeError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("must be at most 53 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "must contain only lowercase letters, digits and '-'",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must start and end with a letter or digit"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_storage_key() {
        let state = ManagedState::new("web", "prod", "kustomize_apply", json!({}));
        assert_eq!(state.storage_key(), "kf.state.v1.prod.web.s1");
    }

    #[test]
    fn test_next_increments_serial() {
        let mut first = ManagedState::new("web", "default", "kustomize_apply", json!({}));
        first.set_yaml("kind: ConfigMap\n".to_string());
        first.objects.push(r#"{"kind":"ConfigMap"}"#.to_string());
        first.mark_applied();

        first.workdir = Some(PathBuf::from("/srv/overlays/prod"));

        let second = ManagedState::next(&first, json!({"namespace": "apps"}));
        assert_eq!(second.serial, 2);
        assert_eq!(second.workdir, first.workdir);
        assert_eq!(second.objects, first.objects);
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(matches!(second.state, StateStatus::Pending { .. }));
        assert_eq!(second.config["namespace"], "apps");
    }

    #[test]
    fn test_manifest_id() {
        assert_eq!(
            manifest_id(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let mut state = ManagedState::new("web", "default", "kustomize_build", json!({}));
        state.set_yaml("a: b\n".to_string());
        assert_eq!(state.id, manifest_id("a: b\n"));
    }

    #[test]
    fn test_status_serialization() {
        let mut state = ManagedState::new("web", "default", "kustomize_apply", json!({}));
        state.mark_failed("Failed to create object".to_string());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"]["status"], "failed");
        assert_eq!(json["state"]["reason"], "Failed to create object");
        assert_eq!(json["resourceType"], "kustomize_apply");

        assert!(json.get("workdir").is_none());

        let parsed: ManagedState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.state.to_string(), "failed: Failed to create object");
        assert!(parsed.workdir.is_none());
    }

    #[test]
    fn test_parsed_objects() {
        let mut state = ManagedState::new("web", "default", "kustomize_apply", json!({}));
        state.objects = vec![r#"{"apiVersion":"v1","kind":"Namespace"}"#.to_string()];
        assert_eq!(state.parsed_objects().unwrap()[0]["kind"], "Namespace");

        state.objects.push("not json".to_string());
        assert!(state.parsed_objects().is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("web-01").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("Web").is_err());
        assert!(validate_name("web_01").is_err());
        assert!(validate_name("-web").is_err());
        assert!(validate_name(&"a".repeat(54)).is_err());
    }
}
