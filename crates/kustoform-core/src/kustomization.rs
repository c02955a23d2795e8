//! The Kustomization descriptor consumed by `kustomize build`
//!
//! Field names and omission rules follow Kustomize's own types: empty strings,
//! `false`, zero indexes and empty collections are left out of the document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{self, KustomizeModel};

pub const API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";
pub const KIND: &str = "Kustomization";

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Kustomization {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub openapi: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_prefix: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_suffix: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub common_annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replacements: Vec<ReplacementField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replicas: Vec<Replica>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub crds: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_map_generator: Vec<ConfigMapArgs>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secret_generator: Vec<SecretArgs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm_globals: Option<HelmGlobals>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub helm_charts: Vec<HelmChart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_options: Option<GeneratorOptions>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub generators: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transformers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub build_metadata: Vec<String>,
}

impl Kustomization {
    /// Render the descriptor as YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Parse a descriptor from YAML
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Label {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub pairs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "is_false")]
    pub include_selectors: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub include_templates: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "is_false")]
    pub create: bool,
}

/// Resource selector: an id plus optional label and annotation selectors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Selector {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub annotation_selector: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub label_selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Patch {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub patch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Selector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Image {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub new_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub new_tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub digest: String,
}

/// A replacement, either inline or loaded from `path`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplacementField {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSelector>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetSelector>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceSelector {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub field_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<FieldOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetSelector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Selector>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reject: Vec<Selector>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<FieldOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldOptions {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub delimiter: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub index: i64,
    #[serde(skip_serializing_if = "is_false")]
    pub create: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Replica {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigMapArgs {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub behavior: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub literals: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GeneratorOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecretArgs {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub behavior: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub literals: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GeneratorOptions>,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub type_: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorOptions {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "is_false")]
    pub disable_name_suffix_hash: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub immutable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HelmGlobals {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub chart_home: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub config_home: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HelmChart {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub release_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_values_files: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub values_file: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub values_inline: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub values_merge: String,
    #[serde(rename = "includeCRDs", skip_serializing_if = "is_false")]
    pub include_crds: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub skip_tests: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub api_versions: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name_template: String,
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn flag(value: Option<bool>) -> bool {
    value.unwrap_or(false)
}

fn generator_options(options: &Option<model::GeneratorOptions>) -> Option<GeneratorOptions> {
    options.as_ref().map(|o| GeneratorOptions {
        labels: o.labels.clone(),
        annotations: o.annotations.clone(),
        disable_name_suffix_hash: flag(o.disable_name_suffix_hash),
        immutable: flag(o.immutable),
    })
}

fn field_options(options: &Option<model::ReplacementsOptions>) -> Option<FieldOptions> {
    options.as_ref().map(|o| FieldOptions {
        delimiter: text(&o.delimiter),
        index: o.index.unwrap_or(0),
        create: flag(o.create),
    })
}

fn object_selector(reference: &model::ObjectReference) -> Selector {
    Selector {
        group: text(&reference.group),
        version: text(&reference.version),
        kind: text(&reference.kind),
        name: text(&reference.name),
        namespace: text(&reference.namespace),
        ..Default::default()
    }
}

/// Map a configuration block onto a Kustomization descriptor
pub fn to_kustomization(model: &KustomizeModel) -> Kustomization {
    Kustomization {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        openapi: model.openapi.clone(),
        name_prefix: text(&model.name_prefix),
        name_suffix: text(&model.name_suffix),
        namespace: text(&model.namespace),
        common_labels: model.common_labels.clone(),
        labels: model
            .labels
            .iter()
            .map(|label| Label {
                pairs: label.pairs.clone(),
                include_selectors: flag(label.include_selectors),
                include_templates: flag(label.include_templates),
                fields: label
                    .fields
                    .iter()
                    .map(|spec| FieldSpec {
                        group: text(&spec.group),
                        version: text(&spec.version),
                        kind: text(&spec.kind),
                        path: text(&spec.path),
                        create: flag(spec.create),
                    })
                    .collect(),
            })
            .collect(),
        common_annotations: model.common_annotations.clone(),
        patches: model
            .patches
            .iter()
            .map(|patch| Patch {
                path: text(&patch.path),
                patch: text(&patch.patch),
                target: patch.target.as_ref().map(|t| Selector {
                    group: text(&t.group),
                    version: text(&t.version),
                    kind: text(&t.kind),
                    name: text(&t.name),
                    namespace: text(&t.namespace),
                    annotation_selector: text(&t.annotation_selector),
                    label_selector: text(&t.label_selector),
                }),
            })
            .collect(),
        images: model
            .images
            .iter()
            .map(|image| Image {
                name: text(&image.name),
                new_name: text(&image.new_name),
                new_tag: text(&image.new_tag),
                digest: text(&image.digest),
            })
            .collect(),
        replacements: model
            .replacements
            .iter()
            .map(|replacement| ReplacementField {
                source: replacement.source.as_ref().map(|s| SourceSelector {
                    group: text(&s.group),
                    version: text(&s.version),
                    kind: text(&s.kind),
                    name: text(&s.name),
                    namespace: text(&s.namespace),
                    field_path: text(&s.field_path),
                    options: field_options(&s.options),
                }),
                targets: replacement
                    .targets
                    .iter()
                    .map(|target| TargetSelector {
                        select: target.select.as_ref().map(object_selector),
                        reject: target.reject.iter().map(object_selector).collect(),
                        field_paths: target.field_paths.clone(),
                        options: field_options(&target.options),
                    })
                    .collect(),
                path: text(&replacement.path),
            })
            .collect(),
        replicas: model
            .replicas
            .iter()
            .map(|replica| Replica {
                name: text(&replica.name),
                count: replica.count.unwrap_or(0),
            })
            .collect(),
        resources: model.resources.clone(),
        components: model.components.clone(),
        crds: model.crds.clone(),
        config_map_generator: model
            .config_map_generator
            .iter()
            .map(|g| ConfigMapArgs {
                namespace: text(&g.namespace),
                name: text(&g.name),
                behavior: text(&g.behavior),
                literals: g.literals.clone(),
                files: g.files.clone(),
                envs: g.envs.clone(),
                options: generator_options(&g.options),
            })
            .collect(),
        secret_generator: model
            .secret_generator
            .iter()
            .map(|g| SecretArgs {
                namespace: text(&g.namespace),
                name: text(&g.name),
                behavior: text(&g.behavior),
                literals: g.literals.clone(),
                files: g.files.clone(),
                envs: g.envs.clone(),
                options: generator_options(&g.options),
                type_: text(&g.type_),
            })
            .collect(),
        helm_globals: model.helm_globals.as_ref().map(|g| HelmGlobals {
            chart_home: text(&g.chart_home),
            config_home: text(&g.config_home),
        }),
        helm_charts: model
            .helm_charts
            .iter()
            .map(|chart| HelmChart {
                name: text(&chart.name),
                version: text(&chart.version),
                repo: text(&chart.repo),
                release_name: text(&chart.release_name),
                namespace: text(&chart.namespace),
                additional_values_files: chart.additional_values_files.clone(),
                values_file: text(&chart.values_file),
                values_inline: chart.values_inline.clone(),
                values_merge: text(&chart.values_merge),
                include_crds: flag(chart.include_crds),
                skip_tests: flag(chart.skip_tests),
                api_versions: chart.api_versions.clone(),
                name_template: text(&chart.name_template),
            })
            .collect(),
        generator_options: generator_options(&model.generator_options),
        configurations: model.configurations.clone(),
        generators: model.generators.clone(),
        transformers: model.transformers.clone(),
        validators: model.validators.clone(),
        build_metadata: model.build_metadata.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(yaml: &str) -> KustomizeModel {
        KustomizeModel::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_empty_block_is_bare_descriptor() {
        let kustomization = to_kustomization(&KustomizeModel::default());
        insta::assert_snapshot!(kustomization.to_yaml().unwrap(), @r"
        apiVersion: kustomize.config.k8s.io/v1beta1
        kind: Kustomization
        ");
    }

    #[test]
    fn test_descriptor_rendering() {
        let kustomization = to_kustomization(&model(
            r#"
namespace: metallb-system
resources:
  - base
patches:
  - path: patches/affinity.yaml
    target:
      kind: Deployment
      label_selector: app=web
replicas:
  - name: web
images:
  - name: nginx
    new_tag: "1.25"
"#,
        ));

        insta::assert_snapshot!(kustomization.to_yaml().unwrap(), @r"
        apiVersion: kustomize.config.k8s.io/v1beta1
        kind: Kustomization
        namespace: metallb-system
        patches:
        - path: patches/affinity.yaml
          target:
            kind: Deployment
            labelSelector: app=web
        images:
        - name: nginx
          newTag: '1.25'
        replicas:
        - name: web
          count: 0
        resources:
        - base
        ");
    }

    #[test]
    fn test_unset_scalars_are_omitted() {
        let kustomization = to_kustomization(&model(
            r#"
labels:
  - pairs: {team: platform}
    fields:
      - path: spec/selector
        create: false
"#,
        ));

        let value = serde_json::to_value(&kustomization).unwrap();
        assert_eq!(
            value["labels"],
            serde_json::json!([{"pairs": {"team": "platform"}, "fields": [{"path": "spec/selector"}]}])
        );
        assert!(value.get("namePrefix").is_none());
        assert!(value.get("generatorOptions").is_none());
    }

    #[test]
    fn test_replacements_mapping() {
        let kustomization = to_kustomization(&model(
            r#"
replacements:
  - source:
      kind: Secret
      name: db
      field_path: data.password
    targets:
      - select:
          kind: Deployment
        reject:
          - name: legacy
        field_paths: ["spec.template.spec.containers.0.env.0.value"]
        options:
          delimiter: "/"
          index: 1
          create: true
  - path: replacements/shared.yaml
"#,
        ));

        let first = &kustomization.replacements[0];
        let source = first.source.as_ref().unwrap();
        assert_eq!(source.kind, "Secret");
        assert_eq!(source.field_path, "data.password");

        let target = &first.targets[0];
        assert_eq!(target.select.as_ref().unwrap().kind, "Deployment");
        assert_eq!(target.reject[0].name, "legacy");
        assert_eq!(
            target.options,
            Some(FieldOptions {
                delimiter: "/".to_string(),
                index: 1,
                create: true,
            })
        );

        assert_eq!(kustomization.replacements[1].path, "replacements/shared.yaml");
        assert!(kustomization.replacements[1].source.is_none());
    }

    #[test]
    fn test_generators_mapping() {
        let kustomization = to_kustomization(&model(
            r#"
config_map_generator:
  - name: settings
    literals: ["LOG_LEVEL=debug"]
    envs: ["settings.env"]
    options:
      disable_name_suffix_hash: true
secret_generator:
  - name: creds
    env: legacy.env
    files: ["password=secrets/password.txt"]
    type: Opaque
generator_options:
  immutable: true
"#,
        ));

        let config_map = &kustomization.config_map_generator[0];
        assert_eq!(config_map.literals, vec!["LOG_LEVEL=debug"]);
        assert_eq!(config_map.envs, vec!["settings.env"]);
        assert!(config_map.options.as_ref().unwrap().disable_name_suffix_hash);

        let secret = serde_json::to_value(&kustomization.secret_generator[0]).unwrap();
        assert_eq!(
            secret,
            serde_json::json!({
                "name": "creds",
                "files": ["password=secrets/password.txt"],
                "type": "Opaque"
            })
        );

        assert!(kustomization.generator_options.unwrap().immutable);
    }

    #[test]
    fn test_helm_mapping() {
        let kustomization = to_kustomization(&model(
            r#"
helm_globals:
  chart_home: vendor/charts
helm_charts:
  - name: minecraft
    repo: https://itzg.github.io/minecraft-server-charts
    version: 4.9.3
    release_name: survival
    include_crds: true
    values_inline:
      minecraftServer:
        eula: "TRUE"
"#,
        ));

        let value = serde_json::to_value(&kustomization).unwrap();
        assert_eq!(value["helmGlobals"], serde_json::json!({"chartHome": "vendor/charts"}));
        assert_eq!(value["helmCharts"][0]["releaseName"], "survival");
        assert_eq!(value["helmCharts"][0]["includeCRDs"], true);
        assert_eq!(
            value["helmCharts"][0]["valuesInline"]["minecraftServer"]["eula"],
            "TRUE"
        );
    }

    #[test]
    fn test_descriptor_parses_back() {
        let kustomization = to_kustomization(&model(
            r#"
name_prefix: dev-
resources: ["base", "https://example.com/app.yaml"]
"#,
        ));

        let yaml = kustomization.to_yaml().unwrap();
        assert_eq!(Kustomization::from_yaml(&yaml).unwrap(), kustomization);
    }
}
