//! Schemas of the `kustomize` provider, the `kustomize_build` data source and
//! the `kustomize_apply` resource

use std::collections::BTreeMap;

use crate::schema::{Attribute, Schema};

pub const PROVIDER_TYPE: &str = "kustomize";
pub const BUILD_DATA_SOURCE: &str = "kustomize_build";
pub const APPLY_RESOURCE: &str = "kustomize_apply";

const YAML_DESCRIPTION: &str = "The generated Kubernetes manifests in yaml format.";

fn attrs<const N: usize>(entries: [(&str, Attribute); N]) -> BTreeMap<String, Attribute> {
    entries
        .into_iter()
        .map(|(name, attribute)| (name.to_string(), attribute))
        .collect()
}

fn generator_options() -> Attribute {
    Attribute::single_nested(attrs([
        (
            "annotations",
            Attribute::string_map().describe("annotations to add to all generated resources"),
        ),
        (
            "disable_name_suffix_hash",
            Attribute::bool().describe(
                "disable_name_suffix_hash if true disables the default behavior of adding a suffix to the names of generated resources that is a hash of the resource contents",
            ),
        ),
        (
            "immutable",
            Attribute::bool().describe("immutable if true add to all generated resources"),
        ),
        (
            "labels",
            Attribute::string_map().describe("labels to add to all generated resources"),
        ),
    ]))
    .describe("generator_options modify behavior of all ConfigMap and Secret generators")
}

fn replacements_options() -> Attribute {
    Attribute::single_nested(attrs([
        ("delimiter", Attribute::string()),
        ("index", Attribute::int64()),
        ("create", Attribute::bool()),
    ]))
}

fn referent() -> BTreeMap<String, Attribute> {
    attrs([
        ("group", Attribute::string().describe("The group of the referent")),
        ("version", Attribute::string().describe("The version of the referent")),
        ("kind", Attribute::string().describe("The kind of the referent")),
        ("name", Attribute::string().describe("The name of the referent")),
        ("namespace", Attribute::string().describe("The namespace of the referent")),
    ])
}

fn generator_args(kind: &str) -> BTreeMap<String, Attribute> {
    attrs([
        (
            "behavior",
            Attribute::string()
                .describe(format!("behavior configures the strategy for overriding {}", kind)),
        ),
        (
            "envs",
            Attribute::string_list().describe(
                "A list of file paths. The contents of each file should be one key=value pair per line",
            ),
        ),
        (
            "files",
            Attribute::string_list()
                .describe("A list of file sources to use in creating a list of key, value pairs"),
        ),
        (
            "literals",
            Attribute::string_list().describe(
                "A list of literal pair sources. Each literal source should be a key and literal value, e.g. `key=value`",
            ),
        ),
        (
            "name",
            Attribute::string()
                .describe("name - actually the partial name - of the generated resource"),
        ),
        (
            "namespace",
            Attribute::string().describe(format!(
                "namespace for the {}, optional",
                kind.to_lowercase()
            )),
        ),
        ("options", generator_options()),
    ])
}

/// Attributes shared by the data source and the resource
pub fn kustomize_attributes() -> BTreeMap<String, Attribute> {
    let mut secret_args = generator_args("Secret");
    secret_args.insert("env".to_string(), Attribute::string());
    secret_args.insert(
        "type".to_string(),
        Attribute::string().describe("type of the secret, optional"),
    );

    let mut source = referent();
    source.insert(
        "field_path".to_string(),
        Attribute::string().describe("The structured path to the source value"),
    );
    source.insert("options".to_string(), replacements_options());

    attrs([
        (
            "common_annotations",
            Attribute::string_map().describe("common_annotations to add to all objects"),
        ),
        (
            "build_metadata",
            Attribute::string_list().describe(
                "build_metadata is a list of strings used to toggle different build options",
            ),
        ),
        (
            "common_labels",
            Attribute::string_map().describe("common_labels to add to all objects and selectors"),
        ),
        (
            "config_map_generator",
            Attribute::list_nested(generator_args("ConfigMap")).describe(
                "config_map_generator is a list of configmaps to generate from local data (one configMap per list item)",
            ),
        ),
        (
            "configurations",
            Attribute::string_list()
                .describe("configurations is a list of transformer configuration files"),
        ),
        (
            "crds",
            Attribute::string_list().describe(
                "crds specifies relative paths to Custom Resource Definition files. This allows custom resources to be recognized as operands, making it possible to add them to the Resources list. CRDs themselves are not modified.",
            ),
        ),
        ("generator_options", generator_options()),
        (
            "generators",
            Attribute::string_list()
                .describe("generators is a list of files containing custom generators"),
        ),
        (
            "helm_charts",
            Attribute::list_nested(attrs([
                ("name", Attribute::string()),
                ("version", Attribute::string()),
                ("repo", Attribute::string()),
                ("release_name", Attribute::string()),
                ("namespace", Attribute::string()),
                ("values_file", Attribute::string()),
                ("values_inline", Attribute::dynamic()),
                ("values_merge", Attribute::string()),
                ("include_crds", Attribute::bool()),
                ("additional_values_files", Attribute::string_list()),
                ("skip_tests", Attribute::bool()),
                ("api_versions", Attribute::string_list()),
                ("name_template", Attribute::string()),
            ]))
            .describe("helm_charts is a list of helm chart configuration instances"),
        ),
        (
            "helm_globals",
            Attribute::single_nested(attrs([
                (
                    "chart_home",
                    Attribute::string().describe(
                        "chart_home is a file path, relative to the kustomization root, to a directory containing a subdirectory for each chart to be included in the kustomization",
                    ),
                ),
                (
                    "config_home",
                    Attribute::string().describe(
                        "config_home defines a value that kustomize should pass to helm via the HELM_CONFIG_HOME environment variable",
                    ),
                ),
            ]))
            .describe("helm_globals contains helm configuration that isn't chart specific"),
        ),
        (
            "images",
            Attribute::list_nested(attrs([
                ("digest", Attribute::string()),
                ("name", Attribute::string()),
                ("new_name", Attribute::string()),
                ("new_tag", Attribute::string()),
            ]))
            .describe(
                "images is a list of (image name, new name, new tag or digest) for changing image names, tags or digests. This can also be achieved with a patch, but this operator is simpler to specify.",
            ),
        ),
        (
            "labels",
            Attribute::list_nested(attrs([
                (
                    "pairs",
                    Attribute::string_map()
                        .describe("pairs contains the key-value pairs for labels to add"),
                ),
                (
                    "include_selectors",
                    Attribute::bool().describe(
                        "include_selectors inidicates should transformer include the fieldSpecs for selectors",
                    ),
                ),
                (
                    "include_templates",
                    Attribute::bool().describe(
                        "include_templates inidicates should transformer include the template labels",
                    ),
                ),
                (
                    "fields",
                    Attribute::list_nested(attrs([
                        ("create", Attribute::bool()),
                        ("group", Attribute::string()),
                        ("kind", Attribute::string()),
                        ("path", Attribute::string()),
                        ("version", Attribute::string()),
                    ]))
                    .describe(
                        "fields completely specifies a kustomizable field in a k8s API object. It helps define the operands of transformations",
                    ),
                ),
            ]))
            .describe("labels to add to all objects but not selectors"),
        ),
        (
            "name_prefix",
            Attribute::string().describe(
                "name_prefix will prefix the names of all resources mentioned in the kustomization file including generated configmaps and secrets",
            ),
        ),
        (
            "name_suffix",
            Attribute::string().describe(
                "name_suffix will suffix the names of all resources mentioned in the kustomization file including generated configmaps and secrets",
            ),
        ),
        (
            "namespace",
            Attribute::string().describe("namespace to add to all objects"),
        ),
        (
            "replacements",
            Attribute::list_nested(attrs([
                ("path", Attribute::string()),
                (
                    "source",
                    Attribute::single_nested(source).describe("The source of the value"),
                ),
                (
                    "targets",
                    Attribute::list_nested(attrs([
                        (
                            "select",
                            Attribute::single_nested(referent())
                                .required()
                                .describe("Include objects that match this"),
                        ),
                        (
                            "reject",
                            Attribute::list_nested(referent())
                                .describe("Exclude objects that match this"),
                        ),
                        (
                            "field_paths",
                            Attribute::string_list()
                                .describe("The structured path(s) to the target nodes"),
                        ),
                        ("options", replacements_options()),
                    ]))
                    .describe("The N fields to write the value to"),
                ),
            ]))
            .describe("replacements substitute field(s) in N target(s) with a field from a source"),
        ),
        (
            "openapi",
            Attribute::string_map()
                .describe("openapi contains information about what kubernetes schema to use"),
        ),
        (
            "patches",
            Attribute::list_nested(attrs([
                ("path", Attribute::string()),
                ("patch", Attribute::string()),
                (
                    "target",
                    Attribute::single_nested(attrs([
                        ("group", Attribute::string()),
                        ("kind", Attribute::string()),
                        ("name", Attribute::string()),
                        ("namespace", Attribute::string()),
                        ("version", Attribute::string()),
                        ("label_selector", Attribute::string()),
                        ("annotation_selector", Attribute::string()),
                    ]))
                    .describe(
                        "Refers to a Kubernetes object that the patch will be applied to. It must refer to a Kubernetes resource under the purview of this kustomization",
                    ),
                ),
            ]))
            .describe("Apply a patch to multiple resources"),
        ),
        (
            "replicas",
            Attribute::list_nested(attrs([
                ("name", Attribute::string()),
                ("count", Attribute::int64()),
            ]))
            .describe(
                "replicas is a list of (resource name, count) for changing number of replicas for a resources. It will match any group and kind that has a matching name and that is one of: Deployment, ReplicationController, Replicaset, Statefulset.",
            ),
        ),
        (
            "resources",
            Attribute::string_list().describe(
                "resources specifies relative paths to files holding YAML representations of kubernetes API objects. URLs and globs not supported.",
            ),
        ),
        (
            "components",
            Attribute::string_list().describe(
                "components are relative paths or git repository URLs specifying a directory containing a kustomization.yaml file of Kind Component.",
            ),
        ),
        (
            "secret_generator",
            Attribute::list_nested(secret_args).describe(
                "secret_generator is a list of secrets to generate from local data (one secret per list item)",
            ),
        ),
        (
            "transformers",
            Attribute::string_list()
                .describe("transformers is a list of files containing transformers"),
        ),
        (
            "validators",
            Attribute::string_list().describe("validators is a list of files containing validators"),
        ),
    ])
}

/// Schema of the `kustomize_build` data source
pub fn build_data_source_schema() -> Schema {
    Schema::new("Run `kustomize build` to generate Kubernetes manifests and output the YAML string.")
        .with_attributes(kustomize_attributes())
        .with_attribute("id", Attribute::string().computed())
        .with_attribute("yaml", Attribute::string().computed().describe(YAML_DESCRIPTION))
}

/// Schema of the `kustomize_apply` resource
pub fn apply_resource_schema() -> Schema {
    Schema::new(
        "This resource renders Kubernetes manifests using Kustomize and apply the generated manifests, which is equivalent to `kustomize build | kubectl apply -f`.",
    )
    .with_attributes(kustomize_attributes())
    .with_attribute("id", Attribute::string().computed())
    .with_attribute("yaml", Attribute::string().computed().describe(YAML_DESCRIPTION))
    .with_attribute(
        "objects",
        Attribute::string_list()
            .computed()
            .describe("The objects returned by the Kubernetes API server, as JSON strings."),
    )
    .with_attribute(
        "force_conflicts",
        Attribute::bool()
            .describe("Take ownership of fields managed by other field managers during server-side apply."),
    )
    .with_attribute(
        "prune",
        Attribute::bool()
            .describe("Delete objects that were applied before but are no longer part of the build."),
    )
}

/// Attributes of the provider's `kubernetes` block
pub fn kubernetes_attributes() -> BTreeMap<String, Attribute> {
    attrs([
        ("config_path", Attribute::string().describe("A path to a kube config file.")),
        (
            "config_paths",
            Attribute::string_list().describe("A list of paths to the kube config files."),
        ),
        (
            "host",
            Attribute::string().describe("The hostname (in form of URI) of the Kubernetes API."),
        ),
        (
            "username",
            Attribute::string().describe(
                "The username to use for HTTP basic authentication when accessing the Kubernetes API.",
            ),
        ),
        (
            "password",
            Attribute::string().sensitive().describe(
                "The password to use for HTTP basic authentication when accessing the Kubernetes API.",
            ),
        ),
        (
            "token",
            Attribute::string().sensitive().describe("Token of your service account."),
        ),
        (
            "insecure",
            Attribute::bool().describe(
                "Whether the server should be accessed without verifying the TLS certificate.",
            ),
        ),
        (
            "client_certificate",
            Attribute::string().describe("PEM-encoded client certificate for TLS authentication."),
        ),
        (
            "client_key",
            Attribute::string()
                .sensitive()
                .describe("PEM-encoded client certificate key for TLS authentication."),
        ),
        (
            "cluster_ca_certificate",
            Attribute::string()
                .describe("PEM-encoded root certificates bundle for TLS authentication."),
        ),
        (
            "config_context",
            Attribute::string().describe("Context to choose from the config file."),
        ),
    ])
}

/// Schema of the provider configuration
pub fn provider_schema() -> Schema {
    Schema::new(
        "This Kustomization provider is used to build Kubernetes manifests using Kustomization.\nAlthough there are existing providers, this provider gives you the best DX and mitigate the datasource's read when apply issue.",
    )
    .with_attribute(
        "kubernetes",
        Attribute::single_nested(kubernetes_attributes())
            .describe("Kubernetes configuration used in `kustomize_apply`"),
    )
}
