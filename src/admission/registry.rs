//! Webhook handler registry and endpoint-path derivation.
//!
//! The registry is an explicit map keyed by GVR, built once at startup and
//! shared read-only with the dispatcher and server. Construction validates
//! registrations and returns typed errors; there is no process-global
//! mutable registry and no panic-at-call-time for misbuilt handlers.

use std::collections::HashMap;
use std::sync::Arc;

use kube::core::GroupVersionResource;
use thiserror::Error;

use super::{MutatingHandler, ValidatingHandler, WebhookHandler};

/// Base path all validation endpoints hang off.
pub const VALIDATION_BASE_PATH: &str = "/v1/webhook/validation";

/// Base path all mutation endpoints hang off.
pub const MUTATION_BASE_PATH: &str = "/v1/webhook/mutation";

/// Errors raised while building the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate {flavor} webhook registration for {group}/{version}/{resource}")]
    DuplicateHandler {
        flavor: &'static str,
        group: String,
        version: String,
        resource: String,
    },

    #[error("validating handler for {resource} registered no admitters")]
    NoAdmitters { resource: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GvrKey {
    group: String,
    version: String,
    resource: String,
}

impl From<&GroupVersionResource> for GvrKey {
    fn from(gvr: &GroupVersionResource) -> Self {
        Self {
            group: gvr.group.clone(),
            version: gvr.version.clone(),
            resource: gvr.resource.clone(),
        }
    }
}

/// Maps GVRs to the handlers responsible for them.
#[derive(Default)]
pub struct WebhookRegistry {
    validating: HashMap<GvrKey, Arc<dyn ValidatingHandler>>,
    mutating: HashMap<GvrKey, Arc<dyn MutatingHandler>>,
}

impl WebhookRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Validating handler registered for the given GVR, if any.
    pub fn validating_for(&self, gvr: &GroupVersionResource) -> Option<Arc<dyn ValidatingHandler>> {
        self.validating.get(&GvrKey::from(gvr)).cloned()
    }

    /// Mutating handler registered for the given GVR, if any.
    pub fn mutating_for(&self, gvr: &GroupVersionResource) -> Option<Arc<dyn MutatingHandler>> {
        self.mutating.get(&GvrKey::from(gvr)).cloned()
    }

    pub fn validating_handlers(&self) -> impl Iterator<Item = &Arc<dyn ValidatingHandler>> {
        self.validating.values()
    }

    pub fn mutating_handlers(&self) -> impl Iterator<Item = &Arc<dyn MutatingHandler>> {
        self.mutating.values()
    }
}

/// Builder validating each registration as it is added.
#[derive(Default)]
pub struct RegistryBuilder {
    registry: WebhookRegistry,
}

impl RegistryBuilder {
    pub fn validating(
        mut self,
        handler: Arc<dyn ValidatingHandler>,
    ) -> Result<Self, RegistryError> {
        let gvr = handler.gvr();
        if handler.admitters().is_empty() {
            return Err(RegistryError::NoAdmitters {
                resource: gvr.resource,
            });
        }
        let key = GvrKey::from(&gvr);
        if self.registry.validating.contains_key(&key) {
            return Err(duplicate("validating", &gvr));
        }
        self.registry.validating.insert(key, handler);
        Ok(self)
    }

    pub fn mutating(mut self, handler: Arc<dyn MutatingHandler>) -> Result<Self, RegistryError> {
        let gvr = handler.gvr();
        let key = GvrKey::from(&gvr);
        if self.registry.mutating.contains_key(&key) {
            return Err(duplicate("mutating", &gvr));
        }
        self.registry.mutating.insert(key, handler);
        Ok(self)
    }

    pub fn build(self) -> WebhookRegistry {
        self.registry
    }
}

fn duplicate(flavor: &'static str, gvr: &GroupVersionResource) -> RegistryError {
    RegistryError::DuplicateHandler {
        flavor,
        group: gvr.group.clone(),
        version: gvr.version.clone(),
        resource: gvr.resource.clone(),
    }
}

/// Serving path for a handler under the given base.
///
/// A handler-supplied override is appended to the base as-is. Otherwise the
/// sub-path is `<resource>.<group>`, or just `<group>` when the resource is
/// the wildcard marker (group-wide routing).
pub fn endpoint_path<H: WebhookHandler + ?Sized>(base: &str, handler: &H) -> String {
    if let Some(path) = handler.path() {
        return join(base, &path);
    }
    let gvr = handler.gvr();
    if gvr.resource == super::configuration::WILDCARD_RESOURCE {
        join(base, &gvr.group)
    } else {
        join(base, &format!("{}.{}", gvr.resource, gvr.group))
    }
}

fn join(base: &str, tail: &str) -> String {
    if base.is_empty() {
        return tail.to_string();
    }
    if base.ends_with('/') {
        format!("{base}{tail}")
    } else {
        format!("{base}/{tail}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::admission::{Admitter, OperationType};

    struct FakeHandler {
        gvr: GroupVersionResource,
        path: Option<String>,
        admitters: Vec<Arc<dyn Admitter>>,
    }

    impl FakeHandler {
        fn new(group: &str, resource: &str) -> Self {
            Self {
                gvr: GroupVersionResource::gvr(group, "v1", resource),
                path: None,
                admitters: vec![allow_admitter()],
            }
        }
    }

    fn allow_admitter() -> Arc<dyn Admitter> {
        struct Allow;
        #[async_trait::async_trait]
        impl Admitter for Allow {
            async fn admit(
                &self,
                request: &crate::admission::Request,
            ) -> Result<kube::core::admission::AdmissionResponse, crate::admission::AdmissionError>
            {
                Ok(kube::core::admission::AdmissionResponse::from(request))
            }
        }
        Arc::new(Allow)
    }

    impl WebhookHandler for FakeHandler {
        fn gvr(&self) -> GroupVersionResource {
            self.gvr.clone()
        }
        fn operations(&self) -> &[OperationType] {
            &[OperationType::All]
        }
        fn path(&self) -> Option<String> {
            self.path.clone()
        }
    }

    impl ValidatingHandler for FakeHandler {
        fn admitters(&self) -> Vec<Arc<dyn Admitter>> {
            self.admitters.clone()
        }
    }

    #[test]
    fn path_joins_resource_and_group() {
        let handler = FakeHandler::new("management.steward.io", "globalroles");
        assert_eq!(
            endpoint_path("v1/webhook/", &handler),
            "v1/webhook/globalroles.management.steward.io"
        );
    }

    #[test]
    fn path_uses_group_alone_for_wildcard_resource() {
        let handler = FakeHandler::new("management.steward.io", "*");
        assert_eq!(
            endpoint_path("v1/webhook/", &handler),
            "v1/webhook/management.steward.io"
        );
    }

    #[test]
    fn path_override_is_appended_verbatim() {
        let mut handler = FakeHandler::new("management.steward.io", "globalroles");
        handler.path = Some("custom-roles".to_string());
        assert_eq!(endpoint_path("v1/webhook", &handler), "v1/webhook/custom-roles");
    }

    #[test]
    fn registry_routes_by_gvr() {
        let registry = WebhookRegistry::builder()
            .validating(Arc::new(FakeHandler::new("management.steward.io", "globalroles")))
            .unwrap()
            .build();

        let hit = GroupVersionResource::gvr("management.steward.io", "v1", "globalroles");
        assert!(registry.validating_for(&hit).is_some());

        let miss = GroupVersionResource::gvr("management.steward.io", "v1", "clusters");
        assert!(registry.validating_for(&miss).is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let result = WebhookRegistry::builder()
            .validating(Arc::new(FakeHandler::new("management.steward.io", "globalroles")))
            .unwrap()
            .validating(Arc::new(FakeHandler::new("management.steward.io", "globalroles")));

        assert!(matches!(
            result,
            Err(RegistryError::DuplicateHandler { flavor: "validating", .. })
        ));
    }

    #[test]
    fn empty_admitter_list_is_rejected() {
        let mut handler = FakeHandler::new("management.steward.io", "globalroles");
        handler.admitters.clear();
        let result = WebhookRegistry::builder().validating(Arc::new(handler));
        assert!(matches!(result, Err(RegistryError::NoAdmitters { .. })));
    }
}
