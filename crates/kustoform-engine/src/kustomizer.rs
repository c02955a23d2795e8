//! Kustomize build runners

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use kustoform_core::kustomization::Kustomization;
use kustoform_core::{FileSystem, KUSTOMIZATION};
use tokio::process::Command;

use crate::error::{EngineError, Result};
use crate::resmap::ResMap;
use crate::stage::{StagingDir, rebase};

/// Environment variable overriding the `kustomize` executable
pub const KUSTOMIZE_BIN_ENV: &str = "KUSTOMIZE_BIN";

/// Runs a build of the kustomization found at `path` in `fs`
#[async_trait]
pub trait Kustomizer: Send + Sync {
    async fn run(&self, fs: &dyn FileSystem, path: &Path) -> Result<ResMap>;
}

/// Build runner backed by the external `kustomize` executable
#[derive(Debug, Clone)]
pub struct KustomizeCli {
    binary: PathBuf,
    helm_command: Option<String>,
}

impl Default for KustomizeCli {
    fn default() -> Self {
        Self::new()
    }
}

impl KustomizeCli {
    /// Use `$KUSTOMIZE_BIN`, falling back to `kustomize` on the `PATH`
    pub fn new() -> Self {
        let binary = std::env::var_os(KUSTOMIZE_BIN_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("kustomize"));

        Self {
            binary,
            helm_command: None,
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            helm_command: None,
        }
    }

    /// Helm executable used to inflate charts
    pub fn helm_command(mut self, helm: impl Into<String>) -> Self {
        self.helm_command = Some(helm.into());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn build_args(&self, staging: &Path, enable_helm: bool) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            staging.display().to_string(),
            "--load-restrictor".to_string(),
            "LoadRestrictionsNone".to_string(),
        ];

        if enable_helm {
            args.push("--enable-helm".to_string());
            if let Some(helm) = &self.helm_command {
                args.push("--helm-command".to_string());
                args.push(helm.clone());
            }
        }

        args
    }
}

#[async_trait]
impl Kustomizer for KustomizeCli {
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    async fn run(&self, fs: &dyn FileSystem, path: &Path) -> Result<ResMap> {
        let (root, _) = fs.clean_abs(path).map_err(EngineError::staging)?;

        let content = fs
            .read_string(&root.join(KUSTOMIZATION))
            .map_err(EngineError::staging)?;
        let mut kustomization = Kustomization::from_yaml(&content).map_err(EngineError::staging)?;
        rebase(&mut kustomization, fs, &root);

        let staging = StagingDir::create(&root)?;
        let staged = kustomization.to_yaml().map_err(EngineError::Marshal)?;
        tokio::fs::write(staging.kustomization_path(), staged).await?;

        let args = self.build_args(staging.path(), !kustomization.helm_charts.is_empty());
        tracing::debug!(binary = %self.binary.display(), ?args, "running kustomize");

        let output = Command::new(&self.binary)
            .args(&args)
            .current_dir(&root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::KustomizeNotFound {
                        binary: self.binary.display().to_string(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::BuildFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| EngineError::InvalidOutput {
            message: e.to_string(),
        })?;
        let resmap = ResMap::from_yaml(&stdout)?;

        tracing::debug!(resources = resmap.len(), "kustomize build finished");
        Ok(resmap)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use kustoform_core::OverlayFs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write a fake `kustomize` that records its arguments and the staged
    /// descriptor next to the kustomization root, then runs `body`
    fn fake_kustomize(dir: &Path, body: &str) -> PathBuf {
        let script = dir.join("kustomize");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$@\" > \"$2/../args.txt\"\ncat \"$2/kustomization.yaml\" > \"$2/../staged.yaml\"\n{}\n",
                body
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn workdir(descriptor: &str) -> (TempDir, OverlayFs) {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("base")).unwrap();
        std::fs::write(temp.path().join("base/kustomization.yaml"), "resources: []\n").unwrap();
        let fs = OverlayFs::with_workdir(temp.path()).unwrap();
        fs.write_file(Path::new(KUSTOMIZATION), descriptor.as_bytes())
            .unwrap();
        (temp, fs)
    }

    #[tokio::test]
    async fn test_run_stages_and_parses_output() {
        let bin = TempDir::new().unwrap();
        let script = fake_kustomize(
            bin.path(),
            "cat <<'EOF'\napiVersion: v1\nkind: Namespace\nmetadata:\n  name: apps\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n  namespace: apps\nEOF",
        );
        let (temp, fs) = workdir(
            "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nresources:\n- base\n- https://example.com/app.yaml\n",
        );

        let resmap = KustomizeCli::with_binary(&script)
            .run(&fs, Path::new("."))
            .await
            .unwrap();

        assert_eq!(resmap.len(), 2);
        assert_eq!(resmap.resources()[1]["metadata"]["name"], "settings");

        let staged = std::fs::read_to_string(temp.path().join("staged.yaml")).unwrap();
        let staged = Kustomization::from_yaml(&staged).unwrap();
        assert_eq!(staged.resources, vec!["../base", "https://example.com/app.yaml"]);

        let args = std::fs::read_to_string(temp.path().join("args.txt")).unwrap();
        assert!(args.starts_with("build "));
        assert!(args.contains("--load-restrictor LoadRestrictionsNone"));
        assert!(!args.contains("--enable-helm"));

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".kustoform-"))
            .collect();
        assert!(leftovers.is_empty());
        assert!(!temp.path().join(KUSTOMIZATION).exists());
    }

    #[tokio::test]
    async fn test_run_enables_helm_for_charts() {
        let bin = TempDir::new().unwrap();
        let script = fake_kustomize(bin.path(), "exit 0");
        let (temp, fs) = workdir("helmCharts:\n- name: minecraft\n  repo: https://itzg.github.io/minecraft-server-charts\n");

        let resmap = KustomizeCli::with_binary(&script)
            .helm_command("helm3")
            .run(&fs, Path::new("."))
            .await
            .unwrap();
        assert!(resmap.is_empty());

        let args = std::fs::read_to_string(temp.path().join("args.txt")).unwrap();
        assert!(args.contains("--enable-helm --helm-command helm3"));

        let staged = std::fs::read_to_string(temp.path().join("staged.yaml")).unwrap();
        let staged = Kustomization::from_yaml(&staged).unwrap();
        assert_eq!(staged.helm_globals.unwrap().chart_home, "../charts");
    }

    #[tokio::test]
    async fn test_run_reports_build_failure() {
        let bin = TempDir::new().unwrap();
        let script = fake_kustomize(
            bin.path(),
            "echo 'Error: accumulating resources: missing.yaml' >&2\nexit 1",
        );
        let (_temp, fs) = workdir("resources:\n- missing.yaml\n");

        let err = KustomizeCli::with_binary(&script)
            .run(&fs, Path::new("."))
            .await
            .unwrap_err();

        match err {
            EngineError::BuildFailed { stderr, .. } => {
                assert_eq!(stderr, "Error: accumulating resources: missing.yaml");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let (_temp, fs) = workdir("resources: []\n");

        let err = KustomizeCli::with_binary("/nonexistent/kustomize")
            .run(&fs, Path::new("."))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::KustomizeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_run_without_descriptor() {
        let temp = TempDir::new().unwrap();
        let fs = OverlayFs::with_workdir(temp.path()).unwrap();

        let err = KustomizeCli::with_binary("kustomize")
            .run(&fs, Path::new("."))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Staging { .. }));
    }
}
