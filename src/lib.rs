//! steward-webhook library crate
//!
//! Admission control for Steward management resources: the dispatch core,
//! the privilege-escalation resolution engine, and the webhook server that
//! ties them together.

pub mod admission;
pub mod crd;
pub mod health;
pub mod rbac;
pub mod webhooks;

pub use health::HealthState;
pub use webhooks::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, run_webhook_server,
};

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::core::GroupVersionResource;
use kube::runtime::reflector::Store;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::warn;

use admission::{RegistryError, WebhookRegistry};
use crd::{API_GROUP, API_VERSION, GlobalRole, RoleTemplate};
use rbac::escalation::{EscalationChecker, SubjectAccessReviewAuthorizer};
use rbac::global_roles::{CachedGlobalRoles, GlobalRoleStore};
use rbac::resolver::ClusterRuleResolver;
use rbac::templates::{CachedRoleTemplates, RoleTemplateStore};
use webhooks::handlers::{GlobalRoleBindingValidator, GlobalRoleValidator};

/// Create the default watcher configuration for all caches.
///
/// `any_semantic()`: more reliable resource discovery in test environments.
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Spawn a reflector-backed read-only cache for a resource type.
///
/// The store is fed by a background watch task with automatic retry and
/// backoff; watch errors are logged and the watch resumes. Handlers only
/// ever read the store, so requests never block on cluster writes.
fn spawn_reflector<K>(client: &Client) -> Store<K>
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let api: Api<K> = Api::all(client.clone());
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, default_watcher_config()))
        .default_backoff()
        .applied_objects();

    tokio::spawn(async move {
        futures::pin_mut!(stream);
        while let Some(next) = stream.next().await {
            if let Err(err) = next {
                warn!(error = %err, "watch stream error");
            }
        }
    });

    reader
}

/// Build the production webhook registry and its supporting caches.
///
/// Spawns watch-fed caches for role templates, global roles, and the RBAC
/// grants backing effective-rule resolution, then wires the escalation
/// checker into the resource handlers. Must be called from within a tokio
/// runtime.
pub fn build_registry(client: Client) -> Result<Arc<WebhookRegistry>, RegistryError> {
    let templates: Arc<dyn RoleTemplateStore> = Arc::new(CachedRoleTemplates::new(
        spawn_reflector::<RoleTemplate>(&client),
    ));
    let roles: Arc<dyn GlobalRoleStore> = Arc::new(CachedGlobalRoles::new(
        spawn_reflector::<GlobalRole>(&client),
    ));

    let resolver = Arc::new(ClusterRuleResolver::new(
        spawn_reflector::<ClusterRole>(&client),
        spawn_reflector::<ClusterRoleBinding>(&client),
        spawn_reflector::<Role>(&client),
        spawn_reflector::<RoleBinding>(&client),
    ));
    let authorizer = Arc::new(SubjectAccessReviewAuthorizer::new(client));
    let checker = Arc::new(EscalationChecker::new(
        authorizer,
        resolver,
        GroupVersionResource::gvr(API_GROUP, API_VERSION, "globalrolebindings"),
    ));

    let registry = WebhookRegistry::builder()
        .validating(Arc::new(GlobalRoleBindingValidator::new(
            roles,
            templates.clone(),
            checker.clone(),
        )))?
        .validating(Arc::new(GlobalRoleValidator::new(templates, checker)))?
        .build();

    Ok(Arc::new(registry))
}
