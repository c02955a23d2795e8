//! Cluster connection settings
//!
//! Resolution order: kubeconfig files (`config_path`, `config_paths`, then
//! `KUBE_CONFIG_PATHS`), an optional context override, then per-attribute
//! overrides applied to the selected cluster and user. Without any of these
//! the connection is inferred the usual way (in-cluster or `~/.kube/config`).

use std::ffi::OsStr;
use std::path::PathBuf;

use base64::Engine;
use kube::config::{KubeConfigOptions, Kubeconfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{KubeError, Result};

/// Environment variable listing kubeconfig files
pub const KUBE_CONFIG_PATHS_ENV: &str = "KUBE_CONFIG_PATHS";

/// Name of the context, cluster and user created when overrides have nothing
/// to attach to
const SYNTHETIC_NAME: &str = "kustoform";

/// The provider's `kubernetes` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_ca_certificate: Option<String>,
}

fn set(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl KubernetesConfig {
    /// Build a client from this configuration
    pub async fn client(&self) -> Result<kube::Client> {
        let config = self.to_kube_config().await?;
        Ok(kube::Client::try_from(config)?)
    }

    /// Resolve into a kube client configuration
    pub async fn to_kube_config(&self) -> Result<kube::Config> {
        let env = std::env::var_os(KUBE_CONFIG_PATHS_ENV);
        self.resolve(env.as_deref()).await
    }

    #[tracing::instrument(skip_all)]
    async fn resolve(&self, env_paths: Option<&OsStr>) -> Result<kube::Config> {
        let paths = self.kubeconfig_paths(env_paths)?;

        if paths.is_empty() && !self.has_overrides() {
            tracing::debug!("no kubeconfig or overrides, inferring configuration");
            return Ok(kube::Config::infer().await?);
        }

        let kubeconfig = match paths.as_slice() {
            [] => Kubeconfig::default(),
            [path] => Kubeconfig::read_from(path)?,
            _ => {
                let mut merged = Kubeconfig::default();
                for path in &paths {
                    merged = merged.merge(Kubeconfig::read_from(path)?)?;
                }
                merged
            }
        };
        tracing::debug!(files = paths.len(), "loaded kubeconfig");

        let kubeconfig = self.apply_overrides(kubeconfig)?;
        let options = KubeConfigOptions {
            context: set(&self.config_context).map(String::from),
            ..Default::default()
        };

        Ok(kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?)
    }

    /// Kubeconfig files to load, `~` expanded
    fn kubeconfig_paths(&self, env_paths: Option<&OsStr>) -> Result<Vec<PathBuf>> {
        let raw: Vec<String> = if let Some(path) = set(&self.config_path) {
            vec![path.to_string()]
        } else if !self.config_paths.is_empty() {
            self.config_paths.clone()
        } else if let Some(env) = env_paths.filter(|v| !v.is_empty()) {
            std::env::split_paths(env)
                .map(|p| p.to_string_lossy().into_owned())
                .collect()
        } else {
            Vec::new()
        };

        raw.iter().map(|p| expand_home(p)).collect()
    }

    fn has_overrides(&self) -> bool {
        self.insecure.unwrap_or(false)
            || [
                &self.host,
                &self.username,
                &self.password,
                &self.token,
                &self.client_certificate,
                &self.client_key,
                &self.cluster_ca_certificate,
            ]
            .into_iter()
            .any(|v| set(v).is_some())
    }

    /// Apply context selection and per-attribute overrides
    fn apply_overrides(&self, kubeconfig: Kubeconfig) -> Result<Kubeconfig> {
        if !self.has_overrides() && set(&self.config_context).is_none() {
            return Ok(kubeconfig);
        }

        let Value::Object(mut doc) = serde_json::to_value(&kubeconfig)? else {
            return Err(KubeError::Kubeconfig("kubeconfig is not a mapping".to_string()));
        };

        if let Some(context) = set(&self.config_context) {
            doc.insert("current-context".to_string(), json!(context));
        }

        if !self.has_overrides() {
            return Ok(serde_json::from_value(Value::Object(doc))?);
        }

        let context_name = doc
            .get("current-context")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(String::from);
        let context = context_name
            .as_deref()
            .and_then(|name| find_named(&doc, "contexts", name))
            .and_then(|entry| entry.get("context"));

        let cluster = context
            .and_then(|c| c.get("cluster"))
            .and_then(Value::as_str)
            .unwrap_or(SYNTHETIC_NAME)
            .to_string();
        let user = context
            .and_then(|c| c.get("user"))
            .and_then(Value::as_str)
            .unwrap_or(SYNTHETIC_NAME)
            .to_string();
        let context_name = context_name.unwrap_or_else(|| SYNTHETIC_NAME.to_string());

        set_fields(
            &mut doc,
            "contexts",
            "context",
            &context_name,
            vec![("cluster", json!(cluster)), ("user", json!(user))],
        );
        doc.insert("current-context".to_string(), json!(context_name));

        let mut cluster_fields = Vec::new();
        let insecure = self.insecure.unwrap_or(false);
        if insecure {
            cluster_fields.push(("insecure-skip-tls-verify", json!(true)));
        }
        if let Some(ca) = set(&self.cluster_ca_certificate) {
            cluster_fields.push(("certificate-authority-data", json!(encode_pem(ca))));
        }
        if let Some(host) = set(&self.host) {
            let default_tls = set(&self.cluster_ca_certificate).is_some()
                || set(&self.client_certificate).is_some()
                || insecure;
            cluster_fields.push(("server", json!(default_server_url(host, default_tls)?)));
        }
        set_fields(&mut doc, "clusters", "cluster", &cluster, cluster_fields);

        let mut user_fields = Vec::new();
        if let Some(cert) = set(&self.client_certificate) {
            user_fields.push(("client-certificate-data", json!(encode_pem(cert))));
        }
        if let Some(username) = set(&self.username) {
            user_fields.push(("username", json!(username)));
        }
        if let Some(password) = set(&self.password) {
            user_fields.push(("password", json!(password)));
        }
        if let Some(key) = set(&self.client_key) {
            user_fields.push(("client-key-data", json!(encode_pem(key))));
        }
        if let Some(token) = set(&self.token) {
            user_fields.push(("token", json!(token)));
        }
        set_fields(&mut doc, "users", "user", &user, user_fields);

        Ok(serde_json::from_value(Value::Object(doc))?)
    }
}

/// Kubeconfig carries certificate data base64 encoded
fn encode_pem(pem: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(pem.as_bytes())
}

fn find_named<'a>(doc: &'a Map<String, Value>, list: &str, name: &str) -> Option<&'a Value> {
    doc.get(list)?
        .as_array()?
        .iter()
        .find(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
}

/// Set `fields` on the `field` object of the entry called `name` in `list`,
/// creating the entry when missing
fn set_fields(
    doc: &mut Map<String, Value>,
    list: &str,
    field: &str,
    name: &str,
    fields: Vec<(&str, Value)>,
) {
    let mut entries = match doc.remove(list) {
        Some(Value::Array(entries)) => entries,
        _ => Vec::new(),
    };

    let index = entries
        .iter()
        .position(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
        .unwrap_or_else(|| {
            entries.push(json!({ "name": name }));
            entries.len() - 1
        });

    if let Value::Object(entry) = &mut entries[index] {
        let target = entry
            .entry(field.to_string())
            .or_insert_with(|| json!({}));
        if !target.is_object() {
            *target = json!({});
        }
        if let Value::Object(target) = target {
            for (key, value) in fields {
                target.insert(key.to_string(), value);
            }
        }
    }

    doc.insert(list.to_string(), Value::Array(entries));
}

/// Expand a leading `~` against the home directory
fn expand_home(path: &str) -> Result<PathBuf> {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => rest,
        _ => return Ok(PathBuf::from(path)),
    };

    let home = dirs::home_dir()
        .ok_or_else(|| KubeError::Kubeconfig(format!("cannot expand {}: no home directory", path)))?;
    Ok(home.join(rest.trim_start_matches(['/', '\\'])))
}

/// Turn a `host` attribute into a server URL
///
/// A bare `host[:port]` gets `https://` when `default_tls` is set and
/// `http://` otherwise. Only `http` and `https` are accepted and the URL may
/// not carry a path.
pub fn default_server_url(host: &str, default_tls: bool) -> Result<String> {
    let host = host.trim();
    let parse_error = |reason: &str| KubeError::HostParse(format!("{:?}: {}", host, reason));

    if host.is_empty() {
        return Err(parse_error("host must not be empty"));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(parse_error("host must not contain whitespace"));
    }

    let (scheme, rest) = match host.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None if default_tls => ("https".to_string(), host),
        None => ("http".to_string(), host),
    };

    if scheme != "http" && scheme != "https" {
        return Err(parse_error("scheme must be http or https"));
    }

    let (authority, path) = match rest.find('/') {
        Some(index) => rest.split_at(index),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(parse_error("missing host name"));
    }
    if !path.is_empty() && path != "/" {
        return Err(parse_error("host must be a URL or a host:port pair"));
    }
    if let Some((_, port)) = authority.rsplit_once(':')
        && !authority.ends_with(']')
        && port.parse::<u16>().is_err()
    {
        return Err(parse_error("invalid port"));
    }

    Ok(format!("{}://{}", scheme, authority))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use tempfile::TempDir;

    const KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev-cluster
  cluster:
    server: https://dev.example.com:6443
- name: prod-cluster
  cluster:
    server: https://prod.example.com:6443
contexts:
- name: dev
  context:
    cluster: dev-cluster
    user: dev-user
    namespace: apps
- name: prod
  context:
    cluster: prod-cluster
    user: prod-user
users:
- name: dev-user
  user:
    token: dev-token
- name: prod-user
  user:
    token: prod-token
"#;

    fn write_kubeconfig(dir: &TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_default_server_url() {
        assert_eq!(default_server_url("10.0.0.1:6443", true).unwrap(), "https://10.0.0.1:6443");
        assert_eq!(default_server_url("localhost:8080", false).unwrap(), "http://localhost:8080");
        assert_eq!(
            default_server_url("https://k8s.example.com/", false).unwrap(),
            "https://k8s.example.com"
        );
        assert_eq!(default_server_url("http://[::1]:6443", true).unwrap(), "http://[::1]:6443");
    }

    #[test]
    fn test_default_server_url_rejects_garbage() {
        for host in ["", "ftp://k8s", "https://", "k8s.example.com/api", "k8s:port", "a b"] {
            let err = default_server_url(host, true).unwrap_err();
            assert!(
                err.to_string().starts_with("failed to parse host"),
                "{host}: {err}"
            );
        }
    }

    #[test]
    fn test_kubeconfig_paths_precedence() {
        let env = OsString::from("/env/a");

        let config = KubernetesConfig {
            config_path: Some("/one".to_string()),
            config_paths: vec!["/two".to_string()],
            ..Default::default()
        };
        assert_eq!(config.kubeconfig_paths(Some(&env)).unwrap(), vec![PathBuf::from("/one")]);

        let config = KubernetesConfig {
            config_paths: vec!["/two".to_string(), "/three".to_string()],
            ..Default::default()
        };
        assert_eq!(config.kubeconfig_paths(Some(&env)).unwrap().len(), 2);

        let joined = std::env::join_paths(["/env/a", "/env/b"]).unwrap();
        let paths = KubernetesConfig::default()
            .kubeconfig_paths(Some(&joined))
            .unwrap();
        assert_eq!(paths, vec![PathBuf::from("/env/a"), PathBuf::from("/env/b")]);

        assert!(KubernetesConfig::default().kubeconfig_paths(None).unwrap().is_empty());
    }

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home("~/.kube/config").unwrap(), home.join(".kube/config"));
        assert_eq!(expand_home("~").unwrap(), home);
        assert_eq!(expand_home("~other/config").unwrap(), PathBuf::from("~other/config"));
        assert_eq!(expand_home("/etc/kube").unwrap(), PathBuf::from("/etc/kube"));
    }

    #[tokio::test]
    async fn test_resolve_single_file_with_context() {
        let dir = TempDir::new().unwrap();
        let config = KubernetesConfig {
            config_path: Some(write_kubeconfig(&dir, "config", KUBECONFIG)),
            config_context: Some("prod".to_string()),
            ..Default::default()
        };

        let resolved = config.resolve(None).await.unwrap();
        assert_eq!(resolved.cluster_url.host(), Some("prod.example.com"));
        assert!(resolved.auth_info.token.is_some());
    }

    #[tokio::test]
    async fn test_resolve_overrides_current_cluster() {
        let dir = TempDir::new().unwrap();
        let config = KubernetesConfig {
            config_path: Some(write_kubeconfig(&dir, "config", KUBECONFIG)),
            host: Some("10.1.2.3:6443".to_string()),
            insecure: Some(true),
            ..Default::default()
        };

        let resolved = config.resolve(None).await.unwrap();
        assert_eq!(resolved.cluster_url.host(), Some("10.1.2.3"));
        assert_eq!(resolved.cluster_url.scheme_str(), Some("https"));
        assert!(resolved.accept_invalid_certs);
        assert_eq!(resolved.default_namespace, "apps");
    }

    #[tokio::test]
    async fn test_resolve_merges_files_first_wins() {
        let dir = TempDir::new().unwrap();
        let first = write_kubeconfig(
            &dir,
            "first",
            r#"apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev-cluster
  cluster:
    server: https://override.example.com:6443
"#,
        );
        let second = write_kubeconfig(&dir, "second", KUBECONFIG);
        let config = KubernetesConfig {
            config_paths: vec![first, second],
            ..Default::default()
        };

        let resolved = config.resolve(None).await.unwrap();
        assert_eq!(resolved.cluster_url.host(), Some("override.example.com"));
    }

    #[tokio::test]
    async fn test_resolve_host_only() {
        let config = KubernetesConfig {
            host: Some("k8s.internal:8080".to_string()),
            token: Some("secret".to_string()),
            ..Default::default()
        };

        let resolved = config.resolve(None).await.unwrap();
        assert_eq!(resolved.cluster_url.scheme_str(), Some("http"));
        assert_eq!(resolved.cluster_url.port_u16(), Some(8080));
        assert!(resolved.auth_info.token.is_some());
    }

    #[tokio::test]
    async fn test_resolve_invalid_host() {
        let config = KubernetesConfig {
            host: Some("ftp://k8s".to_string()),
            ..Default::default()
        };

        let err = config.resolve(None).await.unwrap_err();
        assert!(matches!(err, KubeError::HostParse(_)));
    }

    #[test]
    fn test_deserialize_block() {
        let config: KubernetesConfig = serde_json::from_value(json!({
            "config_path": "~/.kube/config",
            "insecure": true,
        }))
        .unwrap();
        assert_eq!(config.config_path.as_deref(), Some("~/.kube/config"));
        assert_eq!(config.insecure, Some(true));
        assert!(config.config_paths.is_empty());
    }
}
