//! Admission webhook server.
//!
//! Serves one POST endpoint per registered handler and hands every review to
//! the dispatcher.
//!
//! To enable the webhook:
//! 1. Deploy cert-manager (or equivalent) for TLS certificates
//! 2. Apply the generated webhook configurations
//! 3. Mount the TLS certificate secret to the pod at /etc/webhook/certs/

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use kube::core::admission::AdmissionResponse;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::admission::{
    AdmissionError, Dispatcher, MUTATION_BASE_PATH, Review, VALIDATION_BASE_PATH, endpoint_path,
};
use crate::health::HealthState;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default path to the CA bundle clients verify the serving cert against
pub const WEBHOOK_CA_PATH: &str = "/etc/webhook/certs/ca.crt";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;

/// Shared state for webhook routes
pub struct WebhookState {
    pub dispatcher: Dispatcher,
    pub health: Option<Arc<HealthState>>,
}

impl WebhookState {
    pub fn new(dispatcher: Dispatcher, health: Option<Arc<HealthState>>) -> Self {
        Self { dispatcher, health }
    }
}

/// Create the webhook router, one route per registered handler path.
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    let mut router = Router::new();
    for handler in state.dispatcher.registry().validating_handlers() {
        let path = endpoint_path(VALIDATION_BASE_PATH, handler.as_ref());
        debug!(path = %path, "registering validation endpoint");
        router = router.route(&path, post(validate));
    }
    for handler in state.dispatcher.registry().mutating_handlers() {
        let path = endpoint_path(MUTATION_BASE_PATH, handler.as_ref());
        debug!(path = %path, "registering mutation endpoint");
        router = router.route(&path, post(mutate));
    }
    router.with_state(state)
}

async fn validate(State(state): State<Arc<WebhookState>>, Json(review): Json<Review>) -> Response {
    let resource = requested_resource(&review);
    match state.dispatcher.validate(review).await {
        Ok(review) => respond(&state, &resource, review),
        Err(err) => fail(&state, &resource, &err),
    }
}

async fn mutate(State(state): State<Arc<WebhookState>>, Json(review): Json<Review>) -> Response {
    let resource = requested_resource(&review);
    match state.dispatcher.mutate(review).await {
        Ok(review) => respond(&state, &resource, review),
        Err(err) => fail(&state, &resource, &err),
    }
}

fn requested_resource(review: &Review) -> String {
    review
        .request
        .as_ref()
        .map(|request| request.resource.resource.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

/// A computed verdict always goes out as 200; allow/deny lives in the body.
fn respond(state: &WebhookState, resource: &str, review: Review) -> Response {
    let allowed = review
        .response
        .as_ref()
        .map(|response| response.allowed)
        .unwrap_or(false);
    if let Some(health) = &state.health {
        health.metrics.record_admission(resource, allowed);
    }
    if allowed {
        debug!(resource = %resource, "admission request allowed");
    } else {
        info!(resource = %resource, "admission request denied");
    }
    (StatusCode::OK, Json(review)).into_response()
}

/// Terminal decode/routing failures carry their status in the HTTP code.
fn fail(state: &WebhookState, resource: &str, err: &AdmissionError) -> Response {
    error!(resource = %resource, error = %err, "admission request could not be dispatched");
    if let Some(health) = &state.health {
        health.metrics.record_admission_failure(resource);
    }
    (
        err.status_code(),
        Json(AdmissionResponse::invalid(err.to_string()).into_review()),
    )
        .into_response()
}

/// Errors that can occur when running the webhook server
#[derive(Debug, Error)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Server error
    #[error("webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS.
///
/// Binds to 0.0.0.0:9443 and serves every registered handler endpoint. TLS
/// certificates are loaded from the given PEM files.
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    cert_path: &str,
    key_path: &str,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let app = create_webhook_router(state);

    let config = RustlsConfig::from_pem_file(PathBuf::from(cert_path), PathBuf::from(key_path))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT));
    info!(port = WEBHOOK_PORT, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
