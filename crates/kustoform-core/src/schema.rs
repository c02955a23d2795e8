//! Declarative attribute schemas for the provider, its data source and its
//! resource
//!
//! A schema describes the attributes a configuration block may carry. It is
//! printed by the CLI and used to reject malformed blocks before a build.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Schema of a provider, data source or resource
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    pub description: String,
    pub attributes: BTreeMap<String, Attribute>,
}

/// Value type of an attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeKind {
    String,
    Bool,
    Int64,
    StringList,
    StringMap,
    /// Any JSON object
    Dynamic,
    SingleNested {
        attributes: BTreeMap<String, Attribute>,
    },
    ListNested {
        attributes: BTreeMap<String, Attribute>,
    },
}

impl AttributeKind {
    fn type_name(&self) -> &'static str {
        match self {
            AttributeKind::String => "string",
            AttributeKind::Bool => "bool",
            AttributeKind::Int64 => "number",
            AttributeKind::StringList => "list of string",
            AttributeKind::StringMap => "map of string",
            AttributeKind::Dynamic => "object",
            AttributeKind::SingleNested { .. } => "object",
            AttributeKind::ListNested { .. } => "list of object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    #[serde(flatten)]
    pub kind: AttributeKind,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub computed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sensitive: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Attribute {
    /// An optional attribute of the given kind
    pub fn new(kind: AttributeKind) -> Self {
        Self {
            kind,
            required: false,
            optional: true,
            computed: false,
            sensitive: false,
            description: String::new(),
        }
    }

    pub fn string() -> Self {
        Self::new(AttributeKind::String)
    }

    pub fn bool() -> Self {
        Self::new(AttributeKind::Bool)
    }

    pub fn int64() -> Self {
        Self::new(AttributeKind::Int64)
    }

    pub fn string_list() -> Self {
        Self::new(AttributeKind::StringList)
    }

    pub fn string_map() -> Self {
        Self::new(AttributeKind::StringMap)
    }

    pub fn dynamic() -> Self {
        Self::new(AttributeKind::Dynamic)
    }

    pub fn single_nested(attributes: BTreeMap<String, Attribute>) -> Self {
        Self::new(AttributeKind::SingleNested { attributes })
    }

    pub fn list_nested(attributes: BTreeMap<String, Attribute>) -> Self {
        Self::new(AttributeKind::ListNested { attributes })
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        self
    }

    /// Set by the provider, never by the user
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self.optional = false;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// A problem found while validating a configuration block
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    /// Attribute path, e.g. `replacements[0].targets[1].select`
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl Schema {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, attribute: Attribute) -> Self {
        self.attributes.insert(name.to_string(), attribute);
        self
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, Attribute>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Names of the attributes the user may set
    pub fn settable(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.optional || a.required)
            .map(|(name, _)| name.as_str())
    }

    /// Validate a configuration block, collecting every violation
    pub fn validate(&self, value: &Value) -> Result<(), Vec<SchemaViolation>> {
        let mut violations = Vec::new();
        validate_object(&self.attributes, value, "", &mut violations);
        violations.sort_by(|a, b| a.path.cmp(&b.path));

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn violation(violations: &mut Vec<SchemaViolation>, path: &str, message: impl Into<String>) {
    violations.push(SchemaViolation {
        path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
        message: message.into(),
    });
}

fn validate_object(
    attributes: &BTreeMap<String, Attribute>,
    value: &Value,
    path: &str,
    violations: &mut Vec<SchemaViolation>,
) {
    let Some(object) = value.as_object() else {
        violation(violations, path, "expected an object");
        return;
    };

    for (name, field) in object {
        let field_path = join(path, name);
        match attributes.get(name) {
            None => violation(violations, &field_path, "unsupported attribute"),
            Some(attribute) if field.is_null() => {
                if attribute.required {
                    violation(violations, &field_path, "missing required attribute");
                }
            }
            Some(attribute) if attribute.computed && !attribute.optional => {
                violation(violations, &field_path, "attribute is read-only");
            }
            Some(attribute) => validate_value(&attribute.kind, field, &field_path, violations),
        }
    }

    for (name, attribute) in attributes {
        if attribute.required && !object.contains_key(name) {
            violation(violations, &join(path, name), "missing required attribute");
        }
    }
}

fn validate_value(
    kind: &AttributeKind,
    value: &Value,
    path: &str,
    violations: &mut Vec<SchemaViolation>,
) {
    let mismatch = |violations: &mut Vec<SchemaViolation>| {
        violation(
            violations,
            path,
            format!("expected {}, got {}", kind.type_name(), json_type(value)),
        );
    };

    match kind {
        AttributeKind::String => {
            if !value.is_string() {
                mismatch(violations);
            }
        }
        AttributeKind::Bool => {
            if !value.is_boolean() {
                mismatch(violations);
            }
        }
        AttributeKind::Int64 => {
            if !value.is_i64() {
                mismatch(violations);
            }
        }
        AttributeKind::StringList => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        violation(
                            violations,
                            &format!("{}[{}]", path, i),
                            format!("expected string, got {}", json_type(item)),
                        );
                    }
                }
            }
            None => mismatch(violations),
        },
        AttributeKind::StringMap => match value.as_object() {
            Some(entries) => {
                for (key, entry) in entries {
                    if !entry.is_string() {
                        violation(
                            violations,
                            &join(path, key),
                            format!("expected string, got {}", json_type(entry)),
                        );
                    }
                }
            }
            None => mismatch(violations),
        },
        AttributeKind::Dynamic => {
            if !value.is_object() {
                mismatch(violations);
            }
        }
        AttributeKind::SingleNested { attributes } => {
            validate_object(attributes, value, path, violations);
        }
        AttributeKind::ListNested { attributes } => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_object(attributes, item, &format!("{}[{}]", path, i), violations);
                }
            }
            None => mismatch(violations),
        },
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
