//! Webhook serving layer: the TLS HTTP server and the per-resource handlers.

pub mod handlers;
mod server;

pub use server::{
    WEBHOOK_CA_PATH, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError,
    WebhookState, create_webhook_router, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
