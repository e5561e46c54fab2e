//! Per-request admission state machine.
//!
//! Decode the envelope, match the registered handler for the object's GVR,
//! run the handler's admitters, apply the break-glass bypass, and encode the
//! response with the request's UID. Decode and routing failures are terminal
//! and surface at the HTTP layer; admitter outcomes, including failures,
//! produce a verdict inside a well-formed review.

use std::sync::Arc;

use kube::core::admission::{AdmissionResponse, ConvertAdmissionReviewError};
use tracing::{debug, error, info, warn};

use super::error::{AdmissionError, Result};
use super::registry::WebhookRegistry;
use super::{BypassIdentity, Request, Review, ValidatingHandler, can_handle, deny_with_status};

/// Dispatches admission reviews to registered handlers.
///
/// Holds no per-request state; one dispatcher serves all in-flight requests
/// concurrently.
pub struct Dispatcher {
    registry: Arc<WebhookRegistry>,
    bypass: BypassIdentity,
}

impl Dispatcher {
    pub fn new(registry: Arc<WebhookRegistry>) -> Self {
        Self::with_bypass(registry, BypassIdentity::default())
    }

    pub fn with_bypass(registry: Arc<WebhookRegistry>, bypass: BypassIdentity) -> Self {
        Self { registry, bypass }
    }

    pub fn registry(&self) -> &Arc<WebhookRegistry> {
        &self.registry
    }

    /// Run the validating flow for one review.
    ///
    /// Errors are returned only for terminal decode/routing failures; any
    /// admitter outcome (including failure) is encoded into the returned
    /// review.
    pub async fn validate(&self, review: Review) -> Result<Review> {
        let request = decode(review)?;
        let handler = self
            .registry
            .validating_for(&request.resource)
            .ok_or_else(|| unroutable(&request))?;
        ensure_operation(handler.as_ref(), &request)?;

        debug!(
            uid = %request.uid,
            operation = ?request.operation,
            resource = %request.resource.resource,
            name = %request.name,
            "dispatching validating admission request"
        );

        match self.run_validating(handler.as_ref(), &request).await {
            Err(err) if err.is_terminal() => Err(err),
            verdict => Ok(self.finish(&request, verdict)),
        }
    }

    /// Run the mutating flow for one review: a single admitter.
    pub async fn mutate(&self, review: Review) -> Result<Review> {
        let request = decode(review)?;
        let handler = self
            .registry
            .mutating_for(&request.resource)
            .ok_or_else(|| unroutable(&request))?;
        ensure_operation(handler.as_ref(), &request)?;

        debug!(
            uid = %request.uid,
            operation = ?request.operation,
            resource = %request.resource.resource,
            name = %request.name,
            "dispatching mutating admission request"
        );

        match handler.admitter().admit(&request).await {
            Err(err) if err.is_terminal() => Err(err),
            verdict => Ok(self.finish(&request, verdict)),
        }
    }

    /// Invoke admitters in registration order, short-circuiting on the first
    /// denial or error. Side effects performed by earlier admitters are part
    /// of the contract; later admitters never see a request an earlier one
    /// rejected.
    async fn run_validating(
        &self,
        handler: &dyn ValidatingHandler,
        request: &Request,
    ) -> Result<AdmissionResponse> {
        let mut response = AdmissionResponse::from(request);
        for admitter in handler.admitters() {
            let candidate = admitter.admit(request).await?;
            if !candidate.allowed {
                return Ok(candidate);
            }
            response = candidate;
        }
        Ok(response)
    }

    /// Apply the bypass rule and encode the final review.
    ///
    /// The break-glass identity overrides both plain denials and admitter
    /// failures; it never applies to decode or routing errors, which have
    /// already been returned by this point.
    fn finish(&self, request: &Request, verdict: Result<AdmissionResponse>) -> Review {
        let response = match verdict {
            Ok(response) if response.allowed => response,
            Ok(denial) => {
                if self.bypass.matches(&request.user_info) {
                    info!(
                        uid = %request.uid,
                        user = ?request.user_info.username,
                        "break-glass identity overriding denial"
                    );
                    AdmissionResponse::from(request)
                } else {
                    denial
                }
            }
            Err(err) => {
                if self.bypass.matches(&request.user_info) {
                    warn!(
                        uid = %request.uid,
                        user = ?request.user_info.username,
                        error = %err,
                        "break-glass identity overriding admitter failure"
                    );
                    AdmissionResponse::from(request)
                } else {
                    error!(uid = %request.uid, error = %err, "admitter failed");
                    let code = err.status_code().as_u16();
                    deny_with_status(request, code, "InternalError", &err.to_string())
                }
            }
        };
        response.into_review()
    }
}

fn decode(review: Review) -> Result<Request> {
    review
        .try_into()
        .map_err(|err: ConvertAdmissionReviewError| AdmissionError::Decode(err.to_string()))
}

fn unroutable(request: &Request) -> AdmissionError {
    AdmissionError::UnroutableResource {
        group: request.resource.group.clone(),
        version: request.resource.version.clone(),
        resource: request.resource.resource.clone(),
    }
}

fn ensure_operation(handler: &dyn super::WebhookHandler, request: &Request) -> Result<()> {
    if can_handle(handler, &request.operation) {
        return Ok(());
    }
    Err(AdmissionError::UnhandledOperation {
        operation: format!("{:?}", request.operation),
        resource: request.resource.resource.clone(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::admission::{
        Admitter, BYPASS_GROUP, BYPASS_USERNAME, OperationType, WebhookHandler,
    };
    use async_trait::async_trait;
    use kube::core::GroupVersionResource;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Allow;
    #[async_trait]
    impl Admitter for Allow {
        async fn admit(&self, request: &Request) -> Result<AdmissionResponse> {
            Ok(AdmissionResponse::from(request))
        }
    }

    struct Deny;
    #[async_trait]
    impl Admitter for Deny {
        async fn admit(&self, request: &Request) -> Result<AdmissionResponse> {
            Ok(deny_with_status(request, 403, "Forbidden", "nope"))
        }
    }

    struct Fail;
    #[async_trait]
    impl Admitter for Fail {
        async fn admit(&self, _request: &Request) -> Result<AdmissionResponse> {
            Err(AdmissionError::Resolve(
                crate::rbac::ResolveError::TemplateNotFound("gone".to_string()),
            ))
        }
    }

    /// Counts invocations, then allows.
    struct Counting(Arc<AtomicUsize>);
    #[async_trait]
    impl Admitter for Counting {
        async fn admit(&self, request: &Request) -> Result<AdmissionResponse> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(AdmissionResponse::from(request))
        }
    }

    struct TestHandler {
        admitters: Vec<Arc<dyn Admitter>>,
    }

    impl WebhookHandler for TestHandler {
        fn gvr(&self) -> GroupVersionResource {
            GroupVersionResource::gvr("management.steward.io", "v1", "globalrolebindings")
        }
        fn operations(&self) -> &[OperationType] {
            &[OperationType::Create, OperationType::Update]
        }
    }

    impl ValidatingHandler for TestHandler {
        fn admitters(&self) -> Vec<Arc<dyn Admitter>> {
            self.admitters.clone()
        }
    }

    fn dispatcher(admitters: Vec<Arc<dyn Admitter>>) -> Dispatcher {
        let registry = WebhookRegistry::builder()
            .validating(Arc::new(TestHandler { admitters }))
            .unwrap()
            .build();
        Dispatcher::new(Arc::new(registry))
    }

    fn plain_user() -> Value {
        json!({"username": "jane", "groups": ["system:authenticated"]})
    }

    fn bypass_user() -> Value {
        json!({"username": BYPASS_USERNAME, "groups": ["system:authenticated", BYPASS_GROUP]})
    }

    fn review(operation: &str, resource: &str, user: Value) -> Review {
        serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "review-uid-1",
                "kind": {
                    "group": "management.steward.io",
                    "version": "v1",
                    "kind": "GlobalRoleBinding"
                },
                "resource": {
                    "group": "management.steward.io",
                    "version": "v1",
                    "resource": resource
                },
                "name": "test-binding",
                "operation": operation,
                "userInfo": user,
                "object": {
                    "apiVersion": "management.steward.io/v1",
                    "kind": "GlobalRoleBinding",
                    "metadata": {"name": "test-binding"},
                    "spec": {"globalRoleName": "admin"}
                }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn allowed_when_every_admitter_allows() {
        let dispatcher = dispatcher(vec![Arc::new(Allow), Arc::new(Allow)]);
        let out = dispatcher
            .validate(review("CREATE", "globalrolebindings", plain_user()))
            .await
            .unwrap();
        let response = out.response.unwrap();
        assert!(response.allowed);
        assert_eq!(response.uid, "review-uid-1");
    }

    #[tokio::test]
    async fn denial_short_circuits_later_admitters() {
        let count = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher(vec![Arc::new(Deny), Arc::new(Counting(count.clone()))]);

        let out = dispatcher
            .validate(review("CREATE", "globalrolebindings", plain_user()))
            .await
            .unwrap();
        let response = out.response.unwrap();
        assert!(!response.allowed);
        assert_eq!(response.result.code, 403);
        assert_eq!(response.uid, "review-uid-1");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn admitter_error_becomes_denial() {
        let dispatcher = dispatcher(vec![Arc::new(Allow), Arc::new(Fail)]);
        let out = dispatcher
            .validate(review("CREATE", "globalrolebindings", plain_user()))
            .await
            .unwrap();
        let response = out.response.unwrap();
        assert!(!response.allowed);
        assert_eq!(response.result.code, 500);
        assert_eq!(response.result.reason, "InternalError");
    }

    #[tokio::test]
    async fn bypass_overrides_denial() {
        let dispatcher = dispatcher(vec![Arc::new(Deny)]);
        let out = dispatcher
            .validate(review("CREATE", "globalrolebindings", bypass_user()))
            .await
            .unwrap();
        let response = out.response.unwrap();
        assert!(response.allowed);
        assert_eq!(response.uid, "review-uid-1");
    }

    #[tokio::test]
    async fn bypass_overrides_admitter_error() {
        let dispatcher = dispatcher(vec![Arc::new(Fail)]);
        let out = dispatcher
            .validate(review("CREATE", "globalrolebindings", bypass_user()))
            .await
            .unwrap();
        assert!(out.response.unwrap().allowed);
    }

    #[tokio::test]
    async fn partial_bypass_identity_gets_the_real_verdict() {
        let dispatcher = dispatcher(vec![Arc::new(Deny)]);

        let name_only = json!({"username": BYPASS_USERNAME, "groups": ["system:authenticated"]});
        let out = dispatcher
            .validate(review("CREATE", "globalrolebindings", name_only))
            .await
            .unwrap();
        assert!(!out.response.unwrap().allowed);

        let group_only = json!({"username": "jane", "groups": [BYPASS_GROUP]});
        let out = dispatcher
            .validate(review("CREATE", "globalrolebindings", group_only))
            .await
            .unwrap();
        assert!(!out.response.unwrap().allowed);
    }

    #[tokio::test]
    async fn missing_request_is_a_decode_error() {
        let dispatcher = dispatcher(vec![Arc::new(Allow)]);
        let empty: Review = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview"
        }))
        .unwrap();

        let err = dispatcher.validate(empty).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Decode(_)));
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn unknown_resource_is_a_routing_error() {
        let dispatcher = dispatcher(vec![Arc::new(Allow)]);
        let err = dispatcher
            .validate(review("CREATE", "clusters", plain_user()))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::UnroutableResource { .. }));
    }

    #[tokio::test]
    async fn undeclared_operation_is_a_routing_error() {
        // TestHandler declares CREATE and UPDATE only.
        let dispatcher = dispatcher(vec![Arc::new(Allow)]);
        let err = dispatcher
            .validate(review("DELETE", "globalrolebindings", plain_user()))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::UnhandledOperation { .. }));
    }

    #[tokio::test]
    async fn bypass_does_not_rescue_routing_errors() {
        let dispatcher = dispatcher(vec![Arc::new(Allow)]);
        let err = dispatcher
            .validate(review("DELETE", "globalrolebindings", bypass_user()))
            .await
            .unwrap_err();
        assert!(err.is_terminal());
    }
}
