//! Settings and global flags resolved into provider clients and state

use std::path::{Path, PathBuf};

use clap::Args;
use kustoform_kube::KubernetesConfig;
use kustoform_provider::{Provider, ProviderConfig, ProviderData, Workspace};
use serde_json::Value;

use crate::backend::StateStore;
use crate::error::{CliError, Result};
use crate::settings::{Settings, StateBackend};

/// Flags accepted by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Settings file
    #[arg(long, global = true, env = "KUSTOFORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to a kubeconfig file
    #[arg(long, global = true)]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Kubernetes API server URL
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Bearer token for the API server
    #[arg(long, global = true, env = "KUSTOFORM_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Workspace grouping managed states
    #[arg(short = 'w', long, global = true, env = "KUSTOFORM_WORKSPACE")]
    pub workspace: Option<String>,

    /// Where managed state is stored
    #[arg(long, global = true, env = "KUSTOFORM_STATE_BACKEND", value_enum)]
    pub state_backend: Option<StateBackend>,

    /// Directory of the file state backend
    #[arg(long, global = true, env = "KUSTOFORM_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Directory relative references resolve from (defaults to the block file's directory)
    #[arg(short = 'C', long, global = true)]
    pub workdir: Option<PathBuf>,
}

pub struct Context {
    settings: Settings,
    args: GlobalArgs,
}

impl Context {
    pub fn new(args: GlobalArgs) -> Result<Self> {
        let settings = Settings::load(args.config.as_deref())?;
        Ok(Self { settings, args })
    }

    fn has_kube_flags(&self) -> bool {
        self.args.kubeconfig.is_some()
            || self.args.context.is_some()
            || self.args.host.is_some()
            || self.args.token.is_some()
            || self.args.insecure
    }

    /// Connection settings, flags taking precedence over the settings file
    pub fn kubernetes(&self) -> KubernetesConfig {
        let mut config = self
            .settings
            .provider
            .kubernetes
            .clone()
            .unwrap_or_default();

        if let Some(path) = &self.args.kubeconfig {
            config.config_path = Some(path.clone());
            config.config_paths.clear();
        }
        if let Some(context) = &self.args.context {
            config.config_context = Some(context.clone());
        }
        if let Some(host) = &self.args.host {
            config.host = Some(host.clone());
        }
        if let Some(token) = &self.args.token {
            config.token = Some(token.clone());
        }
        if self.args.insecure {
            config.insecure = Some(true);
        }

        config
    }

    pub fn provider_config(&self, needs_cluster: bool) -> ProviderConfig {
        let configured = self.settings.provider.kubernetes.is_some() || self.has_kube_flags();
        ProviderConfig {
            kubernetes: (needs_cluster || configured).then(|| self.kubernetes()),
        }
    }

    /// Without a workdir, commands acting on stored state rebuild from the
    /// directory recorded at apply time
    pub async fn provider(
        &self,
        needs_cluster: bool,
        workdir: Option<PathBuf>,
    ) -> Result<ProviderData> {
        let data = Provider::configure(&self.provider_config(needs_cluster)).await?;
        Ok(match workdir {
            Some(workdir) => data.with_workdir(workdir),
            None => data,
        })
    }

    /// `-C`, else the directory of the block file
    pub fn workdir_for(&self, block: &Path) -> PathBuf {
        if let Some(workdir) = self.explicit_workdir() {
            return workdir;
        }

        block
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn explicit_workdir(&self) -> Option<PathBuf> {
        self.args.workdir.clone()
    }

    pub fn workspace_name(&self) -> &str {
        self.args
            .workspace
            .as_deref()
            .unwrap_or(kustoform_kube::DEFAULT_WORKSPACE)
    }

    pub async fn workspace(&self, data: ProviderData) -> Result<Workspace<StateStore>> {
        let mut state = self.settings.state.clone();
        if let Some(backend) = self.args.state_backend {
            state.backend = backend;
        }
        if let Some(dir) = &self.args.state_dir {
            state.path = Some(dir.clone());
        }

        let store = StateStore::open(&state, &self.kubernetes()).await?;
        let mut workspace = Workspace::new(store, self.workspace_name(), data)?;
        if let Some(max_history) = state.max_history {
            workspace = workspace.with_max_history(max_history);
        }
        Ok(workspace)
    }
}

/// Read a configuration block from a YAML or JSON file
pub fn load_block(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("failed to read {}", path.display()), e))?;

    let block: Value = serde_yaml::from_str(&content).map_err(|e| {
        CliError::validation(format!("failed to parse {}: {}", path.display(), e))
    })?;

    match block {
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(_) => Ok(block),
        _ => Err(CliError::validation_with_help(
            format!("{} does not contain a configuration block", path.display()),
            "A configuration block is a mapping of kustomize attributes, e.g. `resources: [base]`",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(args: GlobalArgs) -> Context {
        Context {
            settings: Settings::default(),
            args,
        }
    }

    #[test]
    fn test_flags_override_settings() {
        let mut ctx = context(GlobalArgs {
            context: Some("kind-dev".to_string()),
            insecure: true,
            ..Default::default()
        });
        ctx.settings.provider.kubernetes = Some(KubernetesConfig {
            config_context: Some("prod".to_string()),
            config_paths: vec!["/a".to_string()],
            ..Default::default()
        });

        let kubernetes = ctx.kubernetes();
        assert_eq!(kubernetes.config_context.as_deref(), Some("kind-dev"));
        assert_eq!(kubernetes.insecure, Some(true));
        assert_eq!(kubernetes.config_paths, vec!["/a"]);
    }

    #[test]
    fn test_provider_config_needs_cluster() {
        let ctx = context(GlobalArgs::default());
        assert!(ctx.provider_config(false).kubernetes.is_none());
        assert!(ctx.provider_config(true).kubernetes.is_some());

        let ctx = context(GlobalArgs {
            host: Some("https://127.0.0.1:6443".to_string()),
            ..Default::default()
        });
        assert!(ctx.provider_config(false).kubernetes.is_some());
    }

    #[test]
    fn test_workdir_for() {
        let ctx = context(GlobalArgs::default());
        assert_eq!(
            ctx.workdir_for(Path::new("overlays/prod/block.yaml")),
            PathBuf::from("overlays/prod")
        );
        assert_eq!(ctx.workdir_for(Path::new("block.yaml")), PathBuf::from("."));
        assert!(ctx.explicit_workdir().is_none());

        let ctx = context(GlobalArgs {
            workdir: Some(PathBuf::from("/srv")),
            ..Default::default()
        });
        assert_eq!(ctx.workdir_for(Path::new("block.yaml")), PathBuf::from("/srv"));
        assert_eq!(ctx.explicit_workdir(), Some(PathBuf::from("/srv")));
    }

    #[test]
    fn test_load_block() {
        let temp = TempDir::new().unwrap();
        let yaml = temp.path().join("block.yaml");
        std::fs::write(&yaml, "namespace: apps\nresources:\n- base\n").unwrap();
        assert_eq!(load_block(&yaml).unwrap()["resources"][0], "base");

        let json = temp.path().join("block.json");
        std::fs::write(&json, r#"{"namespace": "apps"}"#).unwrap();
        assert_eq!(load_block(&json).unwrap()["namespace"], "apps");

        let empty = temp.path().join("empty.yaml");
        std::fs::write(&empty, "").unwrap();
        assert!(load_block(&empty).unwrap().as_object().unwrap().is_empty());

        let list = temp.path().join("list.yaml");
        std::fs::write(&list, "- base\n").unwrap();
        assert!(matches!(load_block(&list), Err(CliError::Validation { .. })));
    }
}
