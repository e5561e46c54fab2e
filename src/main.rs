//! steward-webhook - admission control for Steward management resources.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Builds the webhook registry and its watch-fed caches
//! - Starts the TLS webhook server and the health server

use std::path::Path;
use std::sync::Arc;

use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use kube::Client;
use kube::api::{Api, Patch, PatchParams};
use tokio::signal;
use tracing::{error, info, warn};

use steward_webhook::admission::Dispatcher;
use steward_webhook::admission::configuration::{AUTHORITY_PREFIX, validating_configuration};
use steward_webhook::health::{HealthState, run_health_server};
use steward_webhook::webhooks::{WEBHOOK_CA_PATH, WebhookState};
use steward_webhook::{WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, build_registry, run_webhook_server};

/// Field manager name for server-side apply
const FIELD_MANAGER: &str = "steward-webhook";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("steward_webhook=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting steward-webhook");

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        // Another component installed a provider first; that one wins.
        info!("rustls crypto provider already installed");
    }

    // The webhook cannot serve without TLS; fail fast rather than accept
    // plaintext admission traffic.
    if !Path::new(WEBHOOK_CERT_PATH).exists() || !Path::new(WEBHOOK_KEY_PATH).exists() {
        error!(
            cert = WEBHOOK_CERT_PATH,
            key = WEBHOOK_KEY_PATH,
            "TLS certificates not found"
        );
        return Err("missing webhook TLS certificates".into());
    }

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately (probes should work while caches warm)
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Health server error: {}", e);
            }
        })
    };

    // Build the registry; this spawns the watch-fed caches
    let registry = build_registry(client.clone())?;

    // Publish the generated webhook configuration so the API server routes
    // admission traffic here. The CA bundle is optional; cert-manager CA
    // injection can populate it instead.
    let ca_bundle = match std::fs::read(WEBHOOK_CA_PATH) {
        Ok(pem) => Some(ByteString(pem)),
        Err(err) => {
            warn!(path = WEBHOOK_CA_PATH, error = %err, "CA bundle not readable, leaving caBundle unset");
            None
        }
    };
    let webhook_config = validating_configuration(&registry, ca_bundle);
    let config_api: Api<ValidatingWebhookConfiguration> = Api::all(client);
    config_api
        .patch(
            AUTHORITY_PREFIX,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&webhook_config),
        )
        .await?;
    info!(name = AUTHORITY_PREFIX, "Applied validating webhook configuration");

    let state = Arc::new(WebhookState::new(
        Dispatcher::new(registry),
        Some(health_state.clone()),
    ));

    let webhook_handle = {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_webhook_server(state, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH).await {
                error!("Webhook server error: {}", e);
            }
        })
    };

    health_state.set_ready(true).await;

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = webhook_handle => {
            if let Err(e) = result {
                error!("Webhook server task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
            health_state.set_ready(false).await;
        }
    }

    info!("Webhook stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the service cannot shut
/// down gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
