//! Generated webhook-configuration objects.
//!
//! Builds the ValidatingWebhookConfiguration / MutatingWebhookConfiguration
//! resources that point the API server at this service. Platform defaults:
//! fail closed, equivalent match policy, no side effects, the two most
//! recent admission-review versions.

use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::GroupVersionResource;

use super::registry::{
    MUTATION_BASE_PATH, VALIDATION_BASE_PATH, WebhookRegistry, endpoint_path,
};
use super::WebhookHandler;

/// Wildcard marker for a handler registered group-wide.
pub const WILDCARD_RESOURCE: &str = "*";

/// Authority prefix every generated webhook name starts with.
pub const AUTHORITY_PREFIX: &str = "steward.io";

/// In-cluster service the API server dials.
pub const WEBHOOK_SERVICE_NAME: &str = "steward-webhook";
pub const WEBHOOK_SERVICE_NAMESPACE: &str = "steward-system";
pub const WEBHOOK_SERVICE_PORT: i32 = 443;

const ADMISSION_REVIEW_VERSIONS: [&str; 2] = ["v1", "v1beta1"];
const WEBHOOK_TIMEOUT_SECONDS: i32 = 10;

/// Webhook name for a GVR: the authority prefix, the resource (omitted for
/// the wildcard marker), and the group, dot-joined. The optional suffix
/// splits webhooks that share a GVR but differ by selector criteria.
pub fn webhook_name(gvr: &GroupVersionResource, suffix: Option<&str>) -> String {
    let mut name = if gvr.resource == WILDCARD_RESOURCE {
        format!("{AUTHORITY_PREFIX}.{}", gvr.group)
    } else {
        format!("{AUTHORITY_PREFIX}.{}.{}", gvr.resource, gvr.group)
    };
    if let Some(suffix) = suffix {
        name.push('.');
        name.push_str(suffix);
    }
    name
}

/// A validating webhook entry for one handler, with platform defaults.
pub fn validating_webhook<H: WebhookHandler + ?Sized>(
    handler: &H,
    suffix: Option<&str>,
    ca_bundle: Option<ByteString>,
) -> ValidatingWebhook {
    let gvr = handler.gvr();
    ValidatingWebhook {
        name: webhook_name(&gvr, suffix),
        admission_review_versions: review_versions(),
        side_effects: "None".to_string(),
        failure_policy: Some("Fail".to_string()),
        match_policy: Some("Equivalent".to_string()),
        timeout_seconds: Some(WEBHOOK_TIMEOUT_SECONDS),
        client_config: client_config(endpoint_path(VALIDATION_BASE_PATH, handler), ca_bundle),
        rules: Some(vec![rule_for(handler)]),
        ..Default::default()
    }
}

/// A mutating webhook entry for one handler, with platform defaults.
pub fn mutating_webhook<H: WebhookHandler + ?Sized>(
    handler: &H,
    suffix: Option<&str>,
    ca_bundle: Option<ByteString>,
) -> MutatingWebhook {
    let gvr = handler.gvr();
    MutatingWebhook {
        name: webhook_name(&gvr, suffix),
        admission_review_versions: review_versions(),
        side_effects: "None".to_string(),
        failure_policy: Some("Fail".to_string()),
        match_policy: Some("Equivalent".to_string()),
        timeout_seconds: Some(WEBHOOK_TIMEOUT_SECONDS),
        client_config: client_config(endpoint_path(MUTATION_BASE_PATH, handler), ca_bundle),
        rules: Some(vec![rule_for(handler)]),
        ..Default::default()
    }
}

/// The full validating configuration covering every registered handler.
pub fn validating_configuration(
    registry: &WebhookRegistry,
    ca_bundle: Option<ByteString>,
) -> ValidatingWebhookConfiguration {
    let mut webhooks: Vec<ValidatingWebhook> = registry
        .validating_handlers()
        .map(|handler| validating_webhook(handler.as_ref(), None, ca_bundle.clone()))
        .collect();
    webhooks.sort_by(|a, b| a.name.cmp(&b.name));

    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(AUTHORITY_PREFIX.to_string()),
            ..Default::default()
        },
        webhooks: Some(webhooks),
    }
}

/// The full mutating configuration covering every registered handler.
pub fn mutating_configuration(
    registry: &WebhookRegistry,
    ca_bundle: Option<ByteString>,
) -> MutatingWebhookConfiguration {
    let mut webhooks: Vec<MutatingWebhook> = registry
        .mutating_handlers()
        .map(|handler| mutating_webhook(handler.as_ref(), None, ca_bundle.clone()))
        .collect();
    webhooks.sort_by(|a, b| a.name.cmp(&b.name));

    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(AUTHORITY_PREFIX.to_string()),
            ..Default::default()
        },
        webhooks: Some(webhooks),
    }
}

fn review_versions() -> Vec<String> {
    ADMISSION_REVIEW_VERSIONS
        .iter()
        .map(|v| v.to_string())
        .collect()
}

fn client_config(path: String, ca_bundle: Option<ByteString>) -> WebhookClientConfig {
    WebhookClientConfig {
        service: Some(ServiceReference {
            name: WEBHOOK_SERVICE_NAME.to_string(),
            namespace: WEBHOOK_SERVICE_NAMESPACE.to_string(),
            path: Some(path),
            port: Some(WEBHOOK_SERVICE_PORT),
        }),
        ca_bundle,
        url: None,
    }
}

fn rule_for<H: WebhookHandler + ?Sized>(handler: &H) -> RuleWithOperations {
    let gvr = handler.gvr();
    RuleWithOperations {
        api_groups: Some(vec![gvr.group]),
        api_versions: Some(vec![gvr.version]),
        resources: Some(vec![gvr.resource]),
        operations: Some(
            handler
                .operations()
                .iter()
                .map(|op| op.as_registration_str().to_string())
                .collect(),
        ),
        scope: Some("*".to_string()),
    }
}
