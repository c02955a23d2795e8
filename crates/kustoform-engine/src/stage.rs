//! Staging of the in-memory descriptor for the external `kustomize` binary
//!
//! `kustomize build` only reads from disk, so the descriptor served by the
//! overlay is written into a private directory beneath the kustomization root.
//! Local references are rebased onto that directory with a `../` prefix;
//! anything that does not exist locally (remote bases, git URLs, inline
//! plugin configs) is left untouched.

use std::path::{Path, PathBuf};

use kustoform_core::kustomization::{HelmGlobals, Kustomization};
use kustoform_core::FileSystem;

/// Chart directory Kustomize uses when `helmGlobals.chartHome` is unset
const DEFAULT_CHART_HOME: &str = "charts";

struct Rebaser<'a> {
    fs: &'a dyn FileSystem,
    root: &'a Path,
}

impl Rebaser<'_> {
    fn is_local(&self, reference: &str) -> bool {
        !reference.is_empty()
            && !Path::new(reference).is_absolute()
            && self.fs.exists(&self.root.join(reference))
    }

    fn path(&self, reference: &mut String) {
        if self.is_local(reference) {
            *reference = format!("../{}", reference);
        }
    }

    fn paths(&self, references: &mut [String]) {
        for reference in references {
            self.path(reference);
        }
    }

    /// Generator file sources are either `path` or `key=path`
    fn file_sources(&self, sources: &mut [String]) {
        for source in sources {
            let rebased = match source.split_once('=') {
                Some((key, path)) if self.is_local(path) => Some(format!("{}=../{}", key, path)),
                Some(_) => None,
                None if self.is_local(source) => Some(format!("../{}", source)),
                None => None,
            };
            if let Some(rebased) = rebased {
                *source = rebased;
            }
        }
    }

    /// Plugin lists accept file paths or inline YAML configs
    fn plugins(&self, entries: &mut [String]) {
        for entry in entries {
            if !entry.contains('\n') {
                self.path(entry);
            }
        }
    }
}

/// Rewrite every local reference of `kustomization`, as found relative to
/// `root`, so it resolves from a directory one level below `root`
pub fn rebase(kustomization: &mut Kustomization, fs: &dyn FileSystem, root: &Path) {
    let rebaser = Rebaser { fs, root };

    rebaser.paths(&mut kustomization.resources);
    rebaser.paths(&mut kustomization.components);
    rebaser.paths(&mut kustomization.crds);
    rebaser.paths(&mut kustomization.configurations);
    rebaser.plugins(&mut kustomization.generators);
    rebaser.plugins(&mut kustomization.transformers);
    rebaser.plugins(&mut kustomization.validators);

    for patch in &mut kustomization.patches {
        rebaser.path(&mut patch.path);
    }

    for replacement in &mut kustomization.replacements {
        rebaser.path(&mut replacement.path);
    }

    for generator in &mut kustomization.config_map_generator {
        rebaser.file_sources(&mut generator.files);
        rebaser.paths(&mut generator.envs);
    }

    for generator in &mut kustomization.secret_generator {
        rebaser.file_sources(&mut generator.files);
        rebaser.paths(&mut generator.envs);
    }

    for chart in &mut kustomization.helm_charts {
        rebaser.path(&mut chart.values_file);
        rebaser.paths(&mut chart.additional_values_files);
    }

    if let Some(globals) = &mut kustomization.helm_globals {
        rebase_chart_home(&mut globals.chart_home, root);
    } else if !kustomization.helm_charts.is_empty() {
        let mut globals = HelmGlobals::default();
        rebase_chart_home(&mut globals.chart_home, root);
        kustomization.helm_globals = Some(globals);
    }

    if let Some(path) = kustomization.openapi.get_mut("path") {
        rebaser.path(path);
    }
}

/// Kustomize downloads charts into the chart home, so it is rebased whether or
/// not it exists yet.
fn rebase_chart_home(chart_home: &mut String, root: &Path) {
    if chart_home.is_empty() {
        *chart_home = format!("../{}", DEFAULT_CHART_HOME);
    } else if Path::new(chart_home.as_str()).is_relative() {
        *chart_home = format!("../{}", chart_home);
    } else if let Ok(relative) = Path::new(chart_home.as_str()).strip_prefix(root) {
        *chart_home = format!("../{}", relative.display());
    }
}

/// A staging directory that is removed when dropped
pub struct StagingDir {
    dir: tempfile::TempDir,
}

impl StagingDir {
    /// Create a hidden staging directory inside `root`
    pub fn create(root: &Path) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(".kustoform-")
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn kustomization_path(&self) -> PathBuf {
        self.dir.path().join(kustoform_core::KUSTOMIZATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kustoform_core::kustomization::{ConfigMapArgs, HelmChart, Patch, ReplacementField};
    use kustoform_core::MemoryFs;

    fn fs() -> MemoryFs {
        MemoryFs::new()
            .with_text_file("/work/base/kustomization.yaml", "resources: []")
            .with_text_file("/work/patch.yaml", "kind: Deployment")
            .with_text_file("/work/replacements.yaml", "[]")
            .with_text_file("/work/config/app.properties", "a=b")
            .with_text_file("/work/config/app.env", "A=B")
            .with_text_file("/work/values.yaml", "replicas: 2")
    }

    #[test]
    fn test_rebase_local_references() {
        let fs = fs();
        let mut kustomization = Kustomization {
            resources: vec![
                "base".to_string(),
                "github.com/metallb/metallb/config/native?ref=v0.13.12".to_string(),
                "https://example.com/app.yaml".to_string(),
            ],
            patches: vec![Patch {
                path: "patch.yaml".to_string(),
                ..Default::default()
            }],
            replacements: vec![ReplacementField {
                path: "replacements.yaml".to_string(),
                ..Default::default()
            }],
            config_map_generator: vec![ConfigMapArgs {
                files: vec![
                    "config/app.properties".to_string(),
                    "renamed=config/app.properties".to_string(),
                ],
                envs: vec!["config/app.env".to_string()],
                literals: vec!["KEY=config/app.env".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        };

        rebase(&mut kustomization, &fs, Path::new("/work"));

        assert_eq!(
            kustomization.resources,
            vec![
                "../base",
                "github.com/metallb/metallb/config/native?ref=v0.13.12",
                "https://example.com/app.yaml",
            ]
        );
        assert_eq!(kustomization.patches[0].path, "../patch.yaml");
        assert_eq!(kustomization.replacements[0].path, "../replacements.yaml");

        let generator = &kustomization.config_map_generator[0];
        assert_eq!(
            generator.files,
            vec!["../config/app.properties", "renamed=../config/app.properties"]
        );
        assert_eq!(generator.envs, vec!["../config/app.env"]);
        assert_eq!(generator.literals, vec!["KEY=config/app.env"]);
        assert!(kustomization.helm_globals.is_none());
    }

    #[test]
    fn test_inline_plugin_config_is_untouched() {
        let inline = "apiVersion: builtin\nkind: LabelTransformer\n".to_string();
        let mut kustomization = Kustomization {
            transformers: vec![inline.clone(), "patch.yaml".to_string()],
            ..Default::default()
        };

        rebase(&mut kustomization, &fs(), Path::new("/work"));

        assert_eq!(kustomization.transformers, vec![inline, "../patch.yaml".to_string()]);
    }

    #[test]
    fn test_helm_chart_home_defaults_to_root_charts() {
        let mut kustomization = Kustomization {
            helm_charts: vec![HelmChart {
                name: "minecraft".to_string(),
                values_file: "values.yaml".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        rebase(&mut kustomization, &fs(), Path::new("/work"));

        assert_eq!(kustomization.helm_charts[0].values_file, "../values.yaml");
        assert_eq!(kustomization.helm_globals.unwrap().chart_home, "../charts");
    }

    #[test]
    fn test_helm_chart_home_absolute_inside_root() {
        let mut chart_home = "/work/vendor/charts".to_string();
        rebase_chart_home(&mut chart_home, Path::new("/work"));
        assert_eq!(chart_home, "../vendor/charts");

        let mut chart_home = "/opt/charts".to_string();
        rebase_chart_home(&mut chart_home, Path::new("/work"));
        assert_eq!(chart_home, "/opt/charts");
    }

    #[test]
    fn test_staging_dir_is_removed_on_drop() {
        let root = tempfile::TempDir::new().unwrap();
        let staged_path = {
            let staging = StagingDir::create(root.path()).unwrap();
            assert!(staging.path().starts_with(root.path()));
            staging.path().to_path_buf()
        };
        assert!(!staged_path.exists());
    }
}
