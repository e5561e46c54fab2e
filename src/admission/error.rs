//! Error taxonomy for the admission dispatch core.
//!
//! Decode and routing failures are terminal and map to 4xx HTTP statuses.
//! Admitter failures are not surfaced as HTTP errors; the dispatcher encodes
//! them as denials (or bypasses them) inside a 200 response.

use axum::http::StatusCode;
use thiserror::Error;

use crate::rbac::ResolveError;

/// Errors raised while dispatching an admission review.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The envelope was missing its embedded request or otherwise malformed.
    #[error("malformed admission review: {0}")]
    Decode(String),

    /// The embedded object could not be decoded into its resource type.
    #[error("malformed {kind} object: {source_message}")]
    MalformedObject {
        kind: &'static str,
        source_message: String,
    },

    /// No handler is registered for the request's GVR.
    #[error("no webhook handler registered for {group}/{version}/{resource}")]
    UnroutableResource {
        group: String,
        version: String,
        resource: String,
    },

    /// The matched handler does not declare the request's operation.
    #[error("operation {operation} is not handled by the {resource} webhook")]
    UnhandledOperation { operation: String, resource: String },

    /// A permission resolution failed inside an admitter.
    #[error("failed to resolve permissions: {0}")]
    Resolve(#[from] ResolveError),

    /// A downstream Kubernetes API call failed inside an admitter.
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
}

impl AdmissionError {
    /// HTTP status for errors that terminate the request before a verdict
    /// exists. Admitter-stage errors never reach this mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdmissionError::Decode(_) | AdmissionError::MalformedObject { .. } => {
                StatusCode::BAD_REQUEST
            }
            AdmissionError::UnroutableResource { .. }
            | AdmissionError::UnhandledOperation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AdmissionError::Resolve(_) | AdmissionError::Kube(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// True for decode and routing failures, which surface at the HTTP layer
    /// instead of being encoded as a verdict. An object that cannot be parsed
    /// is a decode failure even when an admitter is the first to notice.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AdmissionError::Decode(_)
                | AdmissionError::MalformedObject { .. }
                | AdmissionError::UnroutableResource { .. }
                | AdmissionError::UnhandledOperation { .. }
        )
    }
}

/// Result type alias for admission operations.
pub type Result<T> = std::result::Result<T, AdmissionError>;
