//! Admission dispatch core.
//!
//! Capability traits for webhook handlers and their admitters, the GVR-keyed
//! registry that routes incoming reviews, and the dispatcher that runs the
//! Decode -> Match -> Admit -> Bypass -> Encode state machine per request.

pub mod configuration;
pub mod dispatcher;
pub mod error;
pub mod registry;

pub use dispatcher::Dispatcher;
pub use error::AdmissionError;
pub use registry::{
    MUTATION_BASE_PATH, RegistryError, VALIDATION_BASE_PATH, WebhookRegistry, endpoint_path,
};

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::UserInfo;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::{DynamicObject, GroupVersionResource, Status};

/// Admission request as dispatched to handlers. Objects stay dynamic at this
/// layer; admitters decode them into typed resources.
pub type Request = AdmissionRequest<DynamicObject>;

/// Admission review envelope as read from and written to the wire.
pub type Review = AdmissionReview<DynamicObject>;

/// Username of the break-glass identity. Combined with [`BYPASS_GROUP`] it is
/// always admitted, so a misconfigured cluster stays recoverable while a
/// webhook dependency is down.
pub const BYPASS_USERNAME: &str = "system:serviceaccount:steward-system:steward-webhook-sudo";

/// Group the break-glass identity must also carry.
pub const BYPASS_GROUP: &str = "system:masters";

/// Operations a handler declares interest in at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Create,
    Update,
    Delete,
    Connect,
    /// Wildcard marker: every operation.
    All,
}

impl OperationType {
    /// True if a request with the given operation falls under this
    /// declaration.
    pub fn handles(self, operation: &Operation) -> bool {
        matches!(
            (self, operation),
            (OperationType::All, _)
                | (OperationType::Create, Operation::Create)
                | (OperationType::Update, Operation::Update)
                | (OperationType::Delete, Operation::Delete)
                | (OperationType::Connect, Operation::Connect)
        )
    }

    /// Registration-time string form used in webhook configurations.
    pub fn as_registration_str(self) -> &'static str {
        match self {
            OperationType::Create => "CREATE",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
            OperationType::Connect => "CONNECT",
            OperationType::All => "*",
        }
    }
}

/// A webhook handler declares the resource and operations it guards.
pub trait WebhookHandler: Send + Sync {
    /// The group/version/resource this handler is registered for.
    fn gvr(&self) -> GroupVersionResource;

    /// Operations the handler accepts.
    fn operations(&self) -> &[OperationType];

    /// Custom serving sub-path, overriding the GVR-derived one.
    fn path(&self) -> Option<String> {
        None
    }
}

/// True if the handler declared the request's operation (or the wildcard).
pub fn can_handle(handler: &dyn WebhookHandler, operation: &Operation) -> bool {
    handler.operations().iter().any(|op| op.handles(operation))
}

/// One independent allow/deny check bound to a handler.
///
/// A denial is an `Ok` response with `allowed == false`; an `Err` means the
/// check itself could not run (a downstream dependency failed).
#[async_trait]
pub trait Admitter: Send + Sync {
    async fn admit(&self, request: &Request) -> Result<AdmissionResponse, AdmissionError>;
}

/// Validating handler: runs every admitter in order, first denial wins.
pub trait ValidatingHandler: WebhookHandler {
    fn admitters(&self) -> Vec<Arc<dyn Admitter>>;
}

/// Mutating handler: exactly one admitter, which may attach a patch.
pub trait MutatingHandler: WebhookHandler {
    fn admitter(&self) -> Arc<dyn Admitter>;
}

/// The identity pair that is always admitted. Both parts must match; a
/// requester carrying only the username or only the group receives the
/// admitters' real verdict.
#[derive(Debug, Clone)]
pub struct BypassIdentity {
    pub username: String,
    pub group: String,
}

impl Default for BypassIdentity {
    fn default() -> Self {
        Self {
            username: BYPASS_USERNAME.to_string(),
            group: BYPASS_GROUP.to_string(),
        }
    }
}

impl BypassIdentity {
    pub fn matches(&self, user: &UserInfo) -> bool {
        user.username.as_deref() == Some(self.username.as_str())
            && user
                .groups
                .as_deref()
                .is_some_and(|groups| groups.iter().any(|g| g == &self.group))
    }
}

/// Denial response carrying a structured status with reason and code.
pub fn deny_with_status(
    request: &Request,
    code: u16,
    reason: &str,
    message: &str,
) -> AdmissionResponse {
    let mut response = AdmissionResponse::from(request);
    response.allowed = false;
    response.result = Status::failure(message, reason).with_code(code);
    response
}
