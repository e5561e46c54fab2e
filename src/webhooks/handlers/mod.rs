//! Validating handlers for Steward management resources.
//!
//! Each handler guards one resource and owns the admitters that run against
//! it. Handlers decode the dynamic object carried by the request into its
//! typed resource before checking anything.

pub mod global_role;
pub mod global_role_binding;

pub use global_role::GlobalRoleValidator;
pub use global_role_binding::GlobalRoleBindingValidator;

use kube::core::DynamicObject;
use serde::de::DeserializeOwned;

use crate::admission::{AdmissionError, Request};

/// Typed view of the request's new object.
pub(crate) fn decode_object<T: DeserializeOwned>(
    request: &Request,
    kind: &'static str,
) -> Result<T, AdmissionError> {
    let object = request
        .object
        .as_ref()
        .ok_or_else(|| AdmissionError::Decode("request carries no object".to_string()))?;
    typed(object, kind)
}

/// Typed view of the request's old object (UPDATE and DELETE requests).
pub(crate) fn decode_old_object<T: DeserializeOwned>(
    request: &Request,
    kind: &'static str,
) -> Result<T, AdmissionError> {
    let object = request
        .old_object
        .as_ref()
        .ok_or_else(|| AdmissionError::Decode("request carries no old object".to_string()))?;
    typed(object, kind)
}

fn typed<T: DeserializeOwned>(
    object: &DynamicObject,
    kind: &'static str,
) -> Result<T, AdmissionError> {
    let value = serde_json::to_value(object).map_err(|err| AdmissionError::MalformedObject {
        kind,
        source_message: err.to_string(),
    })?;
    serde_json::from_value(value).map_err(|err| AdmissionError::MalformedObject {
        kind,
        source_message: err.to_string(),
    })
}
