//! GlobalRoleBinding custom resource definition.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GlobalRoleBinding grants a GlobalRole to a user or group.
///
/// Creating or updating a binding is the privilege-escalation chokepoint:
/// the webhook only admits a binding whose referenced role grants nothing
/// the requester does not already hold.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "management.steward.io",
    version = "v1",
    kind = "GlobalRoleBinding",
    plural = "globalrolebindings",
    shortname = "grb"
)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRoleBindingSpec {
    /// Name of the GlobalRole being granted.
    pub global_role_name: String,

    /// Username the role is granted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    /// Group principal the role is granted to. Exactly one of `userName` or
    /// `groupPrincipalName` is expected to be set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_principal_name: Option<String>,
}
