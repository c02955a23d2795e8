//! Configuration block to built objects

use std::path::Path;

use kustoform_core::{FileSystem, KUSTOMIZATION, KustomizeModel, OverlayFs, to_kustomization};

use crate::error::{EngineError, Result};
use crate::kustomizer::Kustomizer;
use crate::resmap::ResMap;

/// Build a configuration block relative to `workdir`
///
/// The generated descriptor only lives in an overlay filesystem; the
/// directory on disk is never modified.
#[tracing::instrument(skip_all, fields(workdir = %workdir.display()))]
pub async fn build(
    kustomizer: &dyn Kustomizer,
    model: &KustomizeModel,
    workdir: &Path,
) -> Result<ResMap> {
    let fs = OverlayFs::with_workdir(workdir).map_err(EngineError::Overlay)?;

    let yaml = to_kustomization(model)
        .to_yaml()
        .map_err(EngineError::Marshal)?;
    tracing::trace!(kustomization = %yaml, "generated kustomization");

    fs.write_file(Path::new(KUSTOMIZATION), yaml.as_bytes())
        .map_err(EngineError::OverlayWrite)?;

    kustomizer.run(&fs, Path::new(".")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockKustomizer;
    use serde_json::json;

    #[tokio::test]
    async fn test_build_hands_descriptor_to_kustomizer() {
        let temp = tempfile::TempDir::new().unwrap();
        let kustomizer = MockKustomizer::new(vec![json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "metallb-system"}
        })]);
        let model = KustomizeModel::from_yaml("namespace: metallb-system\nresources: [base]\n").unwrap();

        let resmap = build(&kustomizer, &model, temp.path()).await.unwrap();

        assert_eq!(resmap.len(), 1);
        let builds = kustomizer.builds();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].api_version, "kustomize.config.k8s.io/v1beta1");
        assert_eq!(builds[0].namespace, "metallb-system");
        assert_eq!(builds[0].resources, vec!["base"]);
        assert!(!temp.path().join(KUSTOMIZATION).exists());
    }

    #[tokio::test]
    async fn test_build_missing_workdir() {
        let kustomizer = MockKustomizer::default();
        let err = build(
            &kustomizer,
            &KustomizeModel::default(),
            Path::new("/nonexistent/kustoform/workdir"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::Overlay(_)));
    }

    #[tokio::test]
    async fn test_build_propagates_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let kustomizer = MockKustomizer::default();
        kustomizer.fail_with("Error: no such file");

        let err = build(&kustomizer, &KustomizeModel::default(), temp.path())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::BuildFailed { .. }));
    }
}
