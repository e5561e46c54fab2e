//! GlobalRole admission.
//!
//! A GlobalRole is itself a grant: whoever writes one defines permissions
//! that bindings will later hand out. Admission requires that every inherited
//! cluster template resolves, that locked templates are not newly referenced,
//! and that the requester already holds everything the role would confer.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use kube::core::GroupVersionResource;
use kube::core::admission::{AdmissionResponse, Operation};

use crate::admission::{
    AdmissionError, Admitter, OperationType, Request, ValidatingHandler, WebhookHandler,
    deny_with_status,
};
use crate::crd::{API_GROUP, API_VERSION, GlobalRole};
use crate::rbac::escalation::EscalationChecker;
use crate::rbac::global_roles::{cluster_rules, global_rules, templates_for_global_role};
use crate::rbac::templates::RoleTemplateStore;

use super::{decode_object, decode_old_object};

const OPERATIONS: &[OperationType] = &[OperationType::Create, OperationType::Update];

/// Validating handler for GlobalRoles.
pub struct GlobalRoleValidator {
    admitters: Vec<Arc<dyn Admitter>>,
}

impl GlobalRoleValidator {
    pub fn new(templates: Arc<dyn RoleTemplateStore>, checker: Arc<EscalationChecker>) -> Self {
        Self {
            admitters: vec![Arc::new(RoleAdmitter { templates, checker })],
        }
    }
}

impl WebhookHandler for GlobalRoleValidator {
    fn gvr(&self) -> GroupVersionResource {
        GroupVersionResource::gvr(API_GROUP, API_VERSION, "globalroles")
    }

    fn operations(&self) -> &[OperationType] {
        OPERATIONS
    }
}

impl ValidatingHandler for GlobalRoleValidator {
    fn admitters(&self) -> Vec<Arc<dyn Admitter>> {
        self.admitters.clone()
    }
}

struct RoleAdmitter {
    templates: Arc<dyn RoleTemplateStore>,
    checker: Arc<EscalationChecker>,
}

#[async_trait]
impl Admitter for RoleAdmitter {
    async fn admit(&self, request: &Request) -> Result<AdmissionResponse, AdmissionError> {
        let role: GlobalRole = decode_object(request, "GlobalRole")?;

        // Every inherited template must resolve before anything is decided.
        let inherited = templates_for_global_role(self.templates.as_ref(), &role)?;

        // Templates the old revision already referenced stay assignable even
        // if they have been locked since.
        let previously: HashSet<String> = if request.operation == Operation::Update {
            let old: GlobalRole = decode_old_object(request, "GlobalRole")?;
            old.spec.inherited_cluster_roles.iter().cloned().collect()
        } else {
            HashSet::new()
        };

        for template in &inherited {
            if template.spec.locked && !previously.contains(template.template_name()) {
                return Ok(deny_with_status(
                    request,
                    400,
                    "Invalid",
                    &format!(
                        "role template {:?} is locked and cannot be newly assigned",
                        template.template_name()
                    ),
                ));
            }
        }

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
