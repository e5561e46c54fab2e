//! RoleTemplate lookup and inheritance resolution.
//!
//! Templates inherit from other templates by name, and operators do make
//! mistakes: the graph can contain cycles and dangling references. Resolution
//! flattens the reachable graph into a single rule list, tolerating cycles
//! and failing the whole resolution on the first missing template, because a
//! permission picture with holes in it must never back an allow decision.

use std::collections::HashSet;
use std::sync::Arc;

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::runtime::reflector::{ObjectRef, Store};
use thiserror::Error;

use crate::crd::RoleTemplate;

/// Errors surfaced while resolving granted permissions.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A referenced RoleTemplate does not exist.
    #[error("role template {0:?} not found")]
    TemplateNotFound(String),

    /// A referenced GlobalRole does not exist.
    #[error("global role {0:?} not found")]
    GlobalRoleNotFound(String),

    /// A role named by a binding does not exist.
    #[error("{kind} {name:?} referenced by a binding was not found")]
    BoundRoleNotFound { kind: &'static str, name: String },
}

/// Read-only access to RoleTemplates by name.
///
/// Production code reads a watch-fed cache; tests substitute a map.
pub trait RoleTemplateStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Arc<RoleTemplate>, ResolveError>;
}

/// RoleTemplateStore backed by a reflector cache.
#[derive(Clone)]
pub struct CachedRoleTemplates {
    store: Store<RoleTemplate>,
}

impl CachedRoleTemplates {
    pub fn new(store: Store<RoleTemplate>) -> Self {
        Self { store }
    }
}

impl RoleTemplateStore for CachedRoleTemplates {
    fn get(&self, name: &str) -> Result<Arc<RoleTemplate>, ResolveError> {
        self.store
            .get(&ObjectRef::new(name))
            .ok_or_else(|| ResolveError::TemplateNotFound(name.to_string()))
    }
}

/// Flatten a template and everything it inherits into one rule list.
///
/// Depth-first traversal over the inheritance graph. The visited set keys on
/// template name, so each reachable template contributes its rules exactly
/// once and cycles terminate after O(distinct templates) lookups.
pub fn resolve_template(
    store: &dyn RoleTemplateStore,
    name: &str,
) -> Result<Vec<PolicyRule>, ResolveError> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut frontier = vec![name.to_string()];
    let mut rules = Vec::new();

    while let Some(current) = frontier.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let template = store.get(&current)?;
        rules.extend(template.spec.rules.iter().cloned());
        frontier.extend(template.spec.role_template_names.iter().cloned());
    }

    Ok(rules)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::HashMap;

    use super::*;
    use crate::crd::RoleTemplateSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    /// Map-backed store for tests.
    pub struct StaticTemplates(pub HashMap<String, Arc<RoleTemplate>>);

    impl StaticTemplates {
        pub fn of(templates: Vec<RoleTemplate>) -> Self {
            Self(
                templates
                    .into_iter()
                    .map(|t| (t.template_name().to_string(), Arc::new(t)))
                    .collect(),
            )
        }
    }

    impl RoleTemplateStore for StaticTemplates {
        fn get(&self, name: &str) -> Result<Arc<RoleTemplate>, ResolveError> {
            self.0
                .get(name)
                .cloned()
                .ok_or_else(|| ResolveError::TemplateNotFound(name.to_string()))
        }
    }

    pub fn template(name: &str, rules: Vec<PolicyRule>, inherits: &[&str]) -> RoleTemplate {
        RoleTemplate {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: RoleTemplateSpec {
                display_name: name.to_string(),
                rules,
                role_template_names: inherits.iter().map(|s| s.to_string()).collect(),
                locked: false,
                context: Default::default(),
            },
        }
    }

    pub fn rule(group: &str, resource: &str, verbs: &[&str]) -> PolicyRule {
        PolicyRule {
            api_groups: Some(vec![group.to_string()]),
            resources: Some(vec![resource.to_string()]),
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::fixtures::{StaticTemplates, rule, template};
    use super::*;

    #[test]
    fn resolves_own_rules() {
        let store = StaticTemplates::of(vec![template(
            "viewer",
            vec![rule("", "pods", &["get", "list"])],
            &[],
        )]);

        let rules = resolve_template(&store, "viewer").unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].resources.as_deref().unwrap(), ["pods"]);
    }

    #[test]
    fn resolves_inherited_rules_once() {
        let store = StaticTemplates::of(vec![
            template("base", vec![rule("", "pods", &["get"])], &[]),
            // Both parents inherit base; its rules must appear only once.
            template("left", vec![rule("apps", "deployments", &["get"])], &["base"]),
            template("right", vec![rule("batch", "jobs", &["get"])], &["base"]),
            template("top", vec![], &["left", "right"]),
        ]);

        let rules = resolve_template(&store, "top").unwrap();
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn terminates_on_cycles() {
        let store = StaticTemplates::of(vec![
            template("a", vec![rule("", "pods", &["get"])], &["b"]),
            template("b", vec![rule("", "secrets", &["get"])], &["a"]),
        ]);

        let rules = resolve_template(&store, "a").unwrap();
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn self_cycle_terminates() {
        let store = StaticTemplates::of(vec![template(
            "narcissus",
            vec![rule("", "pods", &["get"])],
            &["narcissus"],
        )]);

        let rules = resolve_template(&store, "narcissus").unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn dangling_reference_fails_the_whole_resolution() {
        let store = StaticTemplates::of(vec![template(
            "broken",
            vec![rule("", "pods", &["get"])],
            &["missing"],
        )]);

        let err = resolve_template(&store, "broken").unwrap_err();
        assert!(matches!(err, ResolveError::TemplateNotFound(name) if name == "missing"));
    }

    #[test]
    fn unknown_root_fails() {
        let store = StaticTemplates::of(vec![]);
        assert!(resolve_template(&store, "ghost").is_err());
    }
}
