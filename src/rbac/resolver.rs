//! Effective-rule resolution for a requester.
//!
//! Walks the RBAC grants already present in the cluster (ClusterRoles and
//! ClusterRoleBindings, plus namespaced Roles and RoleBindings when a
//! namespace is in scope) and collects every rule bound to the requester's
//! username, groups, or service-account identity. All reads come from
//! watch-fed caches; nothing here talks to the API server.

use k8s_openapi::api::authentication::v1::UserInfo;
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use kube::runtime::reflector::{ObjectRef, Store};

use super::templates::ResolveError;

/// Resolves the rule set a requester already holds.
///
/// Implemented over cluster caches in production; tests substitute canned
/// rule sets.
pub trait RuleResolver: Send + Sync {
    fn rules_for(
        &self,
        user: &UserInfo,
        namespace: Option<&str>,
    ) -> Result<Vec<PolicyRule>, ResolveError>;
}

/// RuleResolver over reflector caches of the four RBAC object kinds.
#[derive(Clone)]
pub struct ClusterRuleResolver {
    cluster_roles: Store<ClusterRole>,
    cluster_role_bindings: Store<ClusterRoleBinding>,
    roles: Store<Role>,
    role_bindings: Store<RoleBinding>,
}

impl ClusterRuleResolver {
    pub fn new(
        cluster_roles: Store<ClusterRole>,
        cluster_role_bindings: Store<ClusterRoleBinding>,
        roles: Store<Role>,
        role_bindings: Store<RoleBinding>,
    ) -> Self {
        Self {
            cluster_roles,
            cluster_role_bindings,
            roles,
            role_bindings,
        }
    }

    fn cluster_role_rules(&self, role_ref: &RoleRef) -> Result<Vec<PolicyRule>, ResolveError> {
        let role = self
            .cluster_roles
            .get(&ObjectRef::new(&role_ref.name))
            .ok_or_else(|| ResolveError::BoundRoleNotFound {
                kind: "ClusterRole",
                name: role_ref.name.clone(),
            })?;
        Ok(role.rules.clone().unwrap_or_default())
    }

    fn namespaced_role_rules(
        &self,
        role_ref: &RoleRef,
        namespace: &str,
    ) -> Result<Vec<PolicyRule>, ResolveError> {
        match role_ref.kind.as_str() {
            "ClusterRole" => self.cluster_role_rules(role_ref),
            _ => {
                let role = self
                    .roles
                    .get(&ObjectRef::new(&role_ref.name).within(namespace))
                    .ok_or_else(|| ResolveError::BoundRoleNotFound {
                        kind: "Role",
                        name: role_ref.name.clone(),
                    })?;
                Ok(role.rules.clone().unwrap_or_default())
            }
        }
    }
}

impl RuleResolver for ClusterRuleResolver {
    fn rules_for(
        &self,
        user: &UserInfo,
        namespace: Option<&str>,
    ) -> Result<Vec<PolicyRule>, ResolveError> {
        let mut rules = Vec::new();

        for binding in self.cluster_role_bindings.state() {
            if !binding_matches(binding.subjects.as_deref(), user) {
                continue;
            }
            rules.extend(self.cluster_role_rules(&binding.role_ref)?);
        }

        if let Some(namespace) = namespace {
            for binding in self.role_bindings.state() {
                if binding.metadata.namespace.as_deref() != Some(namespace) {
                    continue;
                }
                if !binding_matches(binding.subjects.as_deref(), user) {
                    continue;
                }
                rules.extend(self.namespaced_role_rules(&binding.role_ref, namespace)?);
            }
        }

        Ok(rules)
    }
}

fn binding_matches(subjects: Option<&[Subject]>, user: &UserInfo) -> bool {
    subjects
        .unwrap_or_default()
        .iter()
        .any(|subject| subject_matches(subject, user))
}

fn subject_matches(subject: &Subject, user: &UserInfo) -> bool {
    match subject.kind.as_str() {
        "User" => user.username.as_deref() == Some(subject.name.as_str()),
        "Group" => user
            .groups
            .as_deref()
            .is_some_and(|groups| groups.iter().any(|g| g == &subject.name)),
        "ServiceAccount" => {
            let Some(namespace) = subject.namespace.as_deref() else {
                return false;
            };
            let expected = format!("system:serviceaccount:{namespace}:{}", subject.name);
            user.username.as_deref() == Some(expected.as_str())
        }
        _ => false,
    }
}
