//! GlobalRoleBinding admission.
//!
//! Creating a binding grants the referenced GlobalRole to a subject, so the
//! requester must already hold everything the role would confer, both the
//! role's direct rules and the cluster rules of its inherited templates.
//! Bindings are immutable after creation apart from metadata.

use std::sync::Arc;

use async_trait::async_trait;
use kube::core::GroupVersionResource;
use kube::core::admission::{AdmissionResponse, Operation};

use crate::admission::{
    AdmissionError, Admitter, OperationType, Request, ValidatingHandler, WebhookHandler,
    deny_with_status,
};
use crate::crd::{API_GROUP, API_VERSION, GlobalRoleBinding};
use crate::rbac::escalation::EscalationChecker;
use crate::rbac::global_roles::{GlobalRoleStore, cluster_rules, global_rules};
use crate::rbac::templates::RoleTemplateStore;

use super::{decode_object, decode_old_object};

const OPERATIONS: &[OperationType] = &[OperationType::Create, OperationType::Update];

/// Validating handler for GlobalRoleBindings.
pub struct GlobalRoleBindingValidator {
    admitters: Vec<Arc<dyn Admitter>>,
}

impl GlobalRoleBindingValidator {
    pub fn new(
        roles: Arc<dyn GlobalRoleStore>,
        templates: Arc<dyn RoleTemplateStore>,
        checker: Arc<EscalationChecker>,
    ) -> Self {
        Self {
            admitters: vec![Arc::new(GrantAdmitter {
                roles,
                templates,
                checker,
            })],
        }
    }
}

impl WebhookHandler for GlobalRoleBindingValidator {
    fn gvr(&self) -> GroupVersionResource {
        GroupVersionResource::gvr(API_GROUP, API_VERSION, "globalrolebindings")
    }

    fn operations(&self) -> &[OperationType] {
        OPERATIONS
    }
}

impl ValidatingHandler for GlobalRoleBindingValidator {
    fn admitters(&self) -> Vec<Arc<dyn Admitter>> {
        self.admitters.clone()
    }
}

struct GrantAdmitter {
    roles: Arc<dyn GlobalRoleStore>,
    templates: Arc<dyn RoleTemplateStore>,
    checker: Arc<EscalationChecker>,
}

#[async_trait]
impl Admitter for GrantAdmitter {
    async fn admit(&self, request: &Request) -> Result<AdmissionResponse, AdmissionError> {
        let binding: GlobalRoleBinding = decode_object(request, "GlobalRoleBinding")?;

        if request.operation == Operation::Update {
            let old: GlobalRoleBinding = decode_old_object(request, "GlobalRoleBinding")?;
            if old.spec != binding.spec {
                return Ok(deny_with_status(
                    request,
                    400,
                    "Invalid",
                    "globalrolebindings are immutable; delete and recreate the binding to change it",
                ));
            }
            // Metadata-only update; the grant surface is unchanged.
            return Ok(AdmissionResponse::from(request));
        }

        // A dangling role reference fails closed: without the role there is
        // no way to know what the binding would grant.
        let role = self.roles.get(&binding.spec.global_role_name)?;

        let mut requested = global_rules(Some(&role));
        requested.extend(cluster_rules(self.templates.as_ref(), &role)?);

        let decision = self
            .checker
            .confirm_no_escalation(&request.user_info, &requested, None)
            .await?;

        if decision.allowed {
            Ok(AdmissionResponse::from(request))
        } else {
            let username = request.user_info.username.as_deref().unwrap_or_default();
            Ok(deny_with_status(
                request,
                403,
                "Forbidden",
                &decision.message(username),
            ))
        }
    }
}
