//! GlobalRole custom resource definition.

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GlobalRole grants permissions on Steward management resources and may
/// additionally confer cluster-scoped permissions through inherited
/// RoleTemplates.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "management.steward.io",
    version = "v1",
    kind = "GlobalRole",
    plural = "globalroles",
    shortname = "gr"
)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRoleSpec {
    /// Human-readable name shown in the UI.
    #[serde(default)]
    pub display_name: String,

    /// Policy rules granted directly by this role.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    /// Names of cluster-context RoleTemplates whose resolved rules this role
    /// confers on every cluster.
    #[serde(default)]
    pub inherited_cluster_roles: Vec<String>,
}

impl GlobalRole {
    /// Name of the role, empty if the object carries no metadata name.
    pub fn role_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}
