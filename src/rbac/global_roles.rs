//! GlobalRole resolution.
//!
//! A GlobalRole grants two distinct rule sets: the rules it carries directly
//! (scoped to the management API) and the cluster-scoped rules conferred by
//! its inherited RoleTemplates. The built-in restricted administrator role is
//! special-cased onto the cluster-owner template.

use std::sync::Arc;

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::runtime::reflector::{ObjectRef, Store};

use crate::crd::{GlobalRole, RoleTemplate};

use super::templates::{ResolveError, RoleTemplateStore, resolve_template};

/// Name of the built-in restricted administrator GlobalRole.
pub const RESTRICTED_ADMIN_ROLE: &str = "restricted-admin";

/// Built-in RoleTemplate the restricted administrator maps onto.
pub const CLUSTER_OWNER_TEMPLATE: &str = "cluster-owner";

/// Read-only access to GlobalRoles by name.
pub trait GlobalRoleStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Arc<GlobalRole>, ResolveError>;
}

/// GlobalRoleStore backed by a reflector cache.
#[derive(Clone)]
pub struct CachedGlobalRoles {
    store: Store<GlobalRole>,
}

impl CachedGlobalRoles {
    pub fn new(store: Store<GlobalRole>) -> Self {
        Self { store }
    }
}

impl GlobalRoleStore for CachedGlobalRoles {
    fn get(&self, name: &str) -> Result<Arc<GlobalRole>, ResolveError> {
        self.store
            .get(&ObjectRef::new(name))
            .ok_or_else(|| ResolveError::GlobalRoleNotFound(name.to_string()))
    }
}

/// Rules the role grants directly, verbatim. `None` grants nothing.
pub fn global_rules(role: Option<&GlobalRole>) -> Vec<PolicyRule> {
    role.map(|r| r.spec.rules.clone()).unwrap_or_default()
}

/// Cluster-scoped rules the role confers through inherited templates.
///
/// The restricted administrator always resolves the built-in cluster-owner
/// template, whatever its `inheritedClusterRoles` field claims. Any single
/// resolution failure aborts the whole call.
pub fn cluster_rules(
    store: &dyn RoleTemplateStore,
    role: &GlobalRole,
) -> Result<Vec<PolicyRule>, ResolveError> {
    if role.role_name() == RESTRICTED_ADMIN_ROLE {
        return resolve_template(store, CLUSTER_OWNER_TEMPLATE);
    }

    let mut rules = Vec::new();
    for name in &role.spec.inherited_cluster_roles {
        rules.extend(resolve_template(store, name)?);
    }
    Ok(rules)
}

/// The top-level RoleTemplate objects a GlobalRole inherits, unresolved.
///
/// Callers that need template metadata (the `locked` flag, the context tag)
/// use this instead of the flattened rule form.
pub fn templates_for_global_role(
    store: &dyn RoleTemplateStore,
    role: &GlobalRole,
) -> Result<Vec<Arc<RoleTemplate>>, ResolveError> {
    if role.role_name() == RESTRICTED_ADMIN_ROLE {
        return Ok(vec![store.get(CLUSTER_OWNER_TEMPLATE)?]);
    }

    role.spec
        .inherited_cluster_roles
        .iter()
        .map(|name| store.get(name))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::crd::GlobalRoleSpec;
    use crate::rbac::templates::fixtures::{StaticTemplates, rule, template};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn global_role(name: &str, rules: Vec<PolicyRule>, inherited: &[&str]) -> GlobalRole {
        GlobalRole {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: GlobalRoleSpec {
                display_name: name.to_string(),
                rules,
                inherited_cluster_roles: inherited.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn global_rules_are_verbatim() {
        let role = global_role("ops", vec![rule("management.steward.io", "clusters", &["get"])], &[]);
        let rules = global_rules(Some(&role));
        assert_eq!(rules, role.spec.rules);
        assert!(global_rules(None).is_empty());
    }

    #[test]
    fn cluster_rules_union_inherited_templates() {
        let store = StaticTemplates::of(vec![
            template("view", vec![rule("", "pods", &["get"])], &[]),
            template("edit", vec![rule("apps", "deployments", &["*"])], &["view"]),
        ]);
        let role = global_role("dev", vec![], &["edit"]);

        let rules = cluster_rules(&store, &role).unwrap();
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn cluster_rules_missing_template_is_fatal() {
        let store = StaticTemplates::of(vec![template("view", vec![], &[])]);
        let role = global_role("dev", vec![], &["view", "gone"]);

        assert!(cluster_rules(&store, &role).is_err());
    }

    #[test]
    fn restricted_admin_maps_to_cluster_owner() {
        let store = StaticTemplates::of(vec![template(
            CLUSTER_OWNER_TEMPLATE,
            vec![rule("*", "*", &["*"])],
            &[],
        )]);
        // inheritedClusterRoles names a dangling template; the special case
        // must ignore the field entirely.
        let role = global_role(RESTRICTED_ADMIN_ROLE, vec![], &["does-not-exist"]);

        let rules = cluster_rules(&store, &role).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].verbs, ["*"]);
    }

    #[test]
    fn templates_for_global_role_returns_objects() {
        let store = StaticTemplates::of(vec![
            template("view", vec![], &[]),
            template("edit", vec![], &["view"]),
        ]);
        let role = global_role("dev", vec![], &["edit"]);

        let templates = templates_for_global_role(&store, &role).unwrap();
        // Top-level references only; inherited templates are not expanded.
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].template_name(), "edit");
    }

    #[test]
    fn templates_for_global_role_missing_reference_errors() {
        let store = StaticTemplates::of(vec![]);
        let role = global_role("dev", vec![], &["gone"]);
        assert!(templates_for_global_role(&store, &role).is_err());
    }
}
