//! Manifest comparison for plans
//!
//! Objects are matched by kind, namespace and name. Changes are reported in
//! the order of the new manifests, followed by removals in the order of the
//! old ones.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;

/// Diff engine for manifest comparison
pub struct DiffEngine {
    /// Unchanged lines shown around each change
    pub context_lines: usize,
}

impl DiffEngine {
    pub fn new() -> Self {
        Self { context_lines: 3 }
    }

    pub fn with_context(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }

    /// Compare stored manifests with freshly built ones
    pub fn diff_manifests(&self, old: &str, new: &str) -> DiffResult {
        let old_resources = split_objects(old);
        let new_resources = split_objects(new);

        let old_index: HashMap<&ResourceKey, &str> = old_resources
            .iter()
            .map(|(k, content)| (k, content.as_str()))
            .collect();
        let new_keys: std::collections::HashSet<&ResourceKey> =
            new_resources.iter().map(|(k, _)| k).collect();

        let mut changes = Vec::with_capacity(new_resources.len());

        for (key, built) in &new_resources {
            match old_index.get(key) {
                Some(stored) if *stored != built.as_str() => {
                    changes.push(key.change(
                        ChangeType::Modified,
                        self.line_diff(stored, built),
                    ));
                }
                None => {
                    changes.push(key.change(ChangeType::Added, DiffContent::all_added(built)));
                }
                _ => {}
            }
        }

        for (key, stored) in &old_resources {
            if !new_keys.contains(key) {
                changes.push(key.change(ChangeType::Removed, DiffContent::all_removed(stored)));
            }
        }

        DiffResult { changes }
    }

    fn line_diff(&self, old: &str, new: &str) -> DiffContent {
        let diff = TextDiff::from_lines(old, new);
        let mut lines = Vec::new();

        for group in diff.grouped_ops(self.context_lines) {
            for op in group {
                for change in diff.iter_changes(&op) {
                    let line_type = match change.tag() {
                        ChangeTag::Delete => LineType::Removed,
                        ChangeTag::Insert => LineType::Added,
                        ChangeTag::Equal => LineType::Context,
                    };

                    lines.push(DiffLine {
                        line_type,
                        content: change.value().trim_end().to_string(),
                        old_line_no: change.old_index(),
                        new_line_no: change.new_index(),
                    });
                }
            }
        }

        DiffContent { lines }
    }

    /// Per-type counts such as `1 added, 2 removed`
    pub fn summary(&self, result: &DiffResult) -> String {
        let mut parts = Vec::with_capacity(3);

        for change_type in [ChangeType::Added, ChangeType::Modified, ChangeType::Removed] {
            let count = result.changes_by_type(change_type).len();
            if count > 0 {
                parts.push(format!("{} {}", count, change_type));
            }
        }

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of comparing manifests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffResult {
    pub changes: Vec<ResourceChange>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn changes_by_type(&self, change_type: ChangeType) -> Vec<&ResourceChange> {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .collect()
    }
}

/// A change to a single object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub change_type: ChangeType,
    pub diff: DiffContent,
}

impl ResourceChange {
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.kind, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

/// Type of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Removed => write!(f, "removed"),
        }
    }
}

/// Line-level diff of one object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffContent {
    pub lines: Vec<DiffLine>,
}

impl DiffContent {
    fn all_added(content: &str) -> Self {
        Self::uniform(content, LineType::Added)
    }

    fn all_removed(content: &str) -> Self {
        Self::uniform(content, LineType::Removed)
    }

    fn uniform(content: &str, line_type: LineType) -> Self {
        let lines = content
            .lines()
            .enumerate()
            .map(|(i, line)| DiffLine {
                line_type,
                content: line.to_string(),
                old_line_no: (line_type == LineType::Removed).then_some(i),
                new_line_no: (line_type == LineType::Added).then_some(i),
            })
            .collect();

        Self { lines }
    }

    /// Render as `+`/`-`/` ` prefixed lines
    pub fn to_unified_diff(&self) -> String {
        let mut output = String::new();

        for line in &self.lines {
            let prefix = match line.line_type {
                LineType::Added => "+",
                LineType::Removed => "-",
                LineType::Context => " ",
            };
            output.push_str(prefix);
            output.push_str(&line.content);
            output.push('\n');
        }

        output
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffLine {
    pub line_type: LineType,
    pub content: String,
    pub old_line_no: Option<usize>,
    pub new_line_no: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Added,
    Removed,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResourceKey {
    kind: String,
    name: String,
    namespace: Option<String>,
}

impl ResourceKey {
    fn change(&self, change_type: ChangeType, diff: DiffContent) -> ResourceChange {
        ResourceChange {
            kind: self.kind.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            change_type,
            diff,
        }
    }
}

/// Split manifests into objects, each re-rendered as YAML
fn split_objects(manifest: &str) -> Vec<(ResourceKey, String)> {
    let mut resources = Vec::new();

    for document in serde_yaml::Deserializer::from_str(manifest) {
        let Ok(yaml) = serde_yaml::Value::deserialize(document) else {
            continue;
        };
        if yaml.is_null() {
            continue;
        }

        let text = |v: Option<&serde_yaml::Value>| v.and_then(|v| v.as_str()).map(String::from);
        let metadata = yaml.get("metadata");

        let key = ResourceKey {
            kind: text(yaml.get("kind")).unwrap_or_else(|| "Unknown".to_string()),
            name: text(metadata.and_then(|m| m.get("name"))).unwrap_or_else(|| "unnamed".to_string()),
            namespace: text(metadata.and_then(|m| m.get("namespace"))),
        };

        let rendered = serde_yaml::to_string(&yaml).unwrap_or_default();
        resources.push((key, rendered));
    }

    resources
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  namespace: apps
data:
  level: info
---
apiVersion: v1
kind: Service
metadata:
  name: web
  namespace: apps
"#;

    #[test]
    fn test_split_objects() {
        let resources = split_objects(OLD);
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].0.kind, "ConfigMap");
        assert_eq!(resources[1].0.namespace.as_deref(), Some("apps"));
    }

    #[test]
    fn test_no_changes() {
        let result = DiffEngine::new().diff_manifests(OLD, OLD);
        assert!(!result.has_changes());
        assert_eq!(DiffEngine::new().summary(&result), "No changes");
    }

    #[test]
    fn test_added_modified_removed() {
        let new = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  namespace: apps
data:
  level: debug
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: apps
"#;
        let engine = DiffEngine::new();
        let result = engine.diff_manifests(OLD, new);

        let kinds: Vec<(ChangeType, &str)> = result
            .changes
            .iter()
            .map(|c| (c.change_type, c.kind.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeType::Modified, "ConfigMap"),
                (ChangeType::Added, "Deployment"),
                (ChangeType::Removed, "Service"),
            ]
        );
        assert_eq!(engine.summary(&result), "1 added, 1 modified, 1 removed");

        let unified = result.changes[0].diff.to_unified_diff();
        assert!(unified.contains("-  level: info\n"));
        assert!(unified.contains("+  level: debug\n"));
        assert_eq!(result.changes[2].display_name(), "apps/Service/web");
    }

    #[test]
    fn test_everything_added_from_empty() {
        let result = DiffEngine::new().diff_manifests("", OLD);
        assert_eq!(result.changes_by_type(ChangeType::Added).len(), 2);
    }
}
