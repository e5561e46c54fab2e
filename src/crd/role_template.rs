//! RoleTemplate custom resource definition.
//!
//! A RoleTemplate is a named, reusable bundle of RBAC policy rules. Templates
//! may inherit from other templates; the inheritance graph is flattened at
//! admission time by `rbac::templates`.

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Scope a RoleTemplate is meant to be bound in.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TemplateContext {
    /// Grants apply at cluster scope.
    #[default]
    Cluster,
    /// Grants apply within a single project.
    Project,
}

/// RoleTemplate bundles policy rules for reuse across clusters and projects.
///
/// Example:
/// ```yaml
/// apiVersion: management.steward.io/v1
/// kind: RoleTemplate
/// metadata:
///   name: workloads-manage
/// spec:
///   displayName: Manage Workloads
///   context: cluster
///   rules:
///     - apiGroups: ["apps"]
///       resources: ["deployments"]
///       verbs: ["*"]
///   roleTemplateNames:
///     - workloads-view
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "management.steward.io",
    version = "v1",
    kind = "RoleTemplate",
    plural = "roletemplates",
    shortname = "rt"
)]
#[serde(rename_all = "camelCase")]
pub struct RoleTemplateSpec {
    /// Human-readable name shown in the UI.
    #[serde(default)]
    pub display_name: String,

    /// Policy rules granted directly by this template.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    /// Names of other RoleTemplates whose rules this template inherits.
    /// The referenced graph may contain cycles; resolution tolerates them.
    #[serde(default)]
    pub role_template_names: Vec<String>,

    /// A locked template cannot be newly assigned.
    #[serde(default)]
    pub locked: bool,

    /// Whether this template is bound at cluster or project scope.
    #[serde(default)]
    pub context: TemplateContext,
}

impl RoleTemplate {
    /// Name of the template, empty if the object carries no metadata name.
    pub fn template_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}
