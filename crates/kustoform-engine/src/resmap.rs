//! Build output: the ordered list of generated objects

use serde::Deserialize;
use serde_json::Value;

use crate::error::{EngineError, Result};

/// Objects produced by a build, in build order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResMap {
    resources: Vec<Value>,
}

impl ResMap {
    pub fn new(resources: Vec<Value>) -> Self {
        Self { resources }
    }

    /// Parse a multi-document YAML stream
    ///
    /// Empty documents are skipped. Every other document must be an object
    /// carrying `apiVersion` and `kind`.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut resources = Vec::new();

        for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
            let value = Value::deserialize(document).map_err(|e| EngineError::InvalidOutput {
                message: format!("document {}: {}", index, e),
            })?;

            if value.is_null() {
                continue;
            }

            let has_type = value.get("apiVersion").and_then(Value::as_str).is_some()
                && value.get("kind").and_then(Value::as_str).is_some();
            if !has_type {
                return Err(EngineError::InvalidOutput {
                    message: format!("document {} is missing apiVersion or kind", index),
                });
            }

            resources.push(value);
        }

        Ok(Self { resources })
    }

    pub fn resources(&self) -> &[Value] {
        &self.resources
    }

    pub fn into_resources(self) -> Vec<Value> {
        self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Render every object as YAML, documents separated by `---`
    pub fn as_yaml(&self) -> Result<String> {
        let documents = self
            .resources
            .iter()
            .map(serde_yaml::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(EngineError::Marshal)?;

        Ok(documents.join("---\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_yaml_skips_empty_documents() {
        let resmap = ResMap::from_yaml(
            r#"---
apiVersion: v1
kind: Namespace
metadata:
  name: apps
---
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: apps
"#,
        )
        .unwrap();

        assert_eq!(resmap.len(), 2);
        assert_eq!(resmap.resources()[0]["kind"], "Namespace");
        assert_eq!(resmap.resources()[1]["metadata"]["namespace"], "apps");
    }

    #[test]
    fn test_from_yaml_rejects_untyped_documents() {
        let err = ResMap::from_yaml("metadata:\n  name: web\n").unwrap_err();
        assert!(matches!(err, EngineError::InvalidOutput { .. }));
    }

    #[test]
    fn test_empty_output() {
        let resmap = ResMap::from_yaml("").unwrap();
        assert!(resmap.is_empty());
        assert_eq!(resmap.as_yaml().unwrap(), "");
    }

    #[test]
    fn test_as_yaml_joins_documents() {
        let resmap = ResMap::new(vec![
            json!({"apiVersion": "v1", "kind": "ConfigMap"}),
            json!({"apiVersion": "v1", "kind": "Secret"}),
        ]);

        assert_eq!(
            resmap.as_yaml().unwrap(),
            "apiVersion: v1\nkind: ConfigMap\n---\napiVersion: v1\nkind: Secret\n"
        );
    }
}
