//! Privilege-escalation checking.
//!
//! A requester granting permissions must already hold them. Two tiers decide
//! that. Tier 1 asks the authorization server whether the requester holds the
//! `escalate` verb on the binding resource, which lets explicitly trusted
//! identities skip the rule-by-rule comparison; wildcard administrator grants
//! are cheap to confirm this way and expensive to prove by enumeration.
//! Tier 2 is the ground truth: resolve the requester's effective rules and
//! test that they cover every rule being granted.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::UserInfo;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec,
};
use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::api::PostParams;
use kube::core::GroupVersionResource;
use kube::{Api, Client};
use thiserror::Error;
use tracing::{debug, warn};

use super::coverage::{self, format_rule};
use super::resolver::RuleResolver;
use super::templates::ResolveError;

/// Errors from the tier-1 authorization query.
#[derive(Debug, Error)]
pub enum AuthorizerError {
    #[error("subject access review failed: {0}")]
    Kube(#[from] kube::Error),
}

/// Asks whether a requester already holds the `escalate` verb on a resource.
#[async_trait]
pub trait EscalationAuthorizer: Send + Sync {
    async fn can_escalate(
        &self,
        user: &UserInfo,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
    ) -> Result<bool, AuthorizerError>;
}

/// EscalationAuthorizer that issues a SubjectAccessReview.
pub struct SubjectAccessReviewAuthorizer {
    client: Client,
}

impl SubjectAccessReviewAuthorizer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EscalationAuthorizer for SubjectAccessReviewAuthorizer {
    async fn can_escalate(
        &self,
        user: &UserInfo,
        gvr: &GroupVersionResource,
        namespace: Option<&str>,
    ) -> Result<bool, AuthorizerError> {
        let review = SubjectAccessReview {
            spec: SubjectAccessReviewSpec {
                user: user.username.clone(),
                groups: user.groups.clone(),
                uid: user.uid.clone(),
                extra: user.extra.clone(),
                resource_attributes: Some(ResourceAttributes {
                    group: Some(gvr.group.clone()),
                    resource: Some(gvr.resource.clone()),
                    verb: Some("escalate".to_string()),
                    namespace: namespace.map(str::to_string),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let api: Api<SubjectAccessReview> = Api::all(self.client.clone());
        let created = api.create(&PostParams::default(), &review).await?;
        Ok(created.status.map(|status| status.allowed).unwrap_or(false))
    }
}

/// Outcome of an escalation check.
#[derive(Debug, Clone)]
pub struct EscalationDecision {
    pub allowed: bool,
    /// Requested rules the requester does not hold, for diagnostics.
    pub uncovered: Vec<PolicyRule>,
}

impl EscalationDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            uncovered: Vec::new(),
        }
    }

    fn deny(uncovered: Vec<PolicyRule>) -> Self {
        Self {
            allowed: false,
            uncovered,
        }
    }

    /// Denial message naming the requester and the first uncovered rule.
    pub fn message(&self, username: &str) -> String {
        match self.uncovered.first() {
            Some(rule) => format!(
                "user {username:?} attempted to grant permissions they do not hold: {}",
                format_rule(rule)
            ),
            None => format!("user {username:?} is not permitted to make this grant"),
        }
    }
}

/// Decides whether a requester may hand out a set of policy rules.
pub struct EscalationChecker {
    authorizer: Arc<dyn EscalationAuthorizer>,
    resolver: Arc<dyn RuleResolver>,
    binding_gvr: GroupVersionResource,
}

impl EscalationChecker {
    pub fn new(
        authorizer: Arc<dyn EscalationAuthorizer>,
        resolver: Arc<dyn RuleResolver>,
        binding_gvr: GroupVersionResource,
    ) -> Self {
        Self {
            authorizer,
            resolver,
            binding_gvr,
        }
    }

    /// Allow the grant only if the requester cannot escalate through it.
    ///
    /// An authorizer failure downgrades tier 1 to "not authorized by this
    /// path" and evaluation continues; a resolver failure is fatal because a
    /// partial rule set must not back an allow decision.
    pub async fn confirm_no_escalation(
        &self,
        user: &UserInfo,
        requested: &[PolicyRule],
        namespace: Option<&str>,
    ) -> Result<EscalationDecision, ResolveError> {
        let username = user.username.as_deref().unwrap_or_default();

        match self
            .authorizer
            .can_escalate(user, &self.binding_gvr, namespace)
            .await
        {
            Ok(true) => {
                debug!(user = %username, "requester holds the escalate verb, allowing grant");
                return Ok(EscalationDecision::allow());
            }
            Ok(false) => {}
            Err(err) => {
                warn!(
                    user = %username,
                    error = %err,
                    "escalate check unavailable, falling back to rule comparison"
                );
            }
        }

        let held = self.resolver.rules_for(user, namespace)?;
        let uncovered: Vec<PolicyRule> = coverage::uncovered(&held, requested)
            .into_iter()
            .cloned()
            .collect();

        if uncovered.is_empty() {
            Ok(EscalationDecision::allow())
        } else {
            debug!(
                user = %username,
                uncovered = uncovered.len(),
                "denying grant of permissions the requester does not hold"
            );
            Ok(EscalationDecision::deny(uncovered))
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Authorizer returning a fixed verdict, or failing outright.
    pub struct StaticAuthorizer(pub Result<bool, ()>);

    #[async_trait]
    impl EscalationAuthorizer for StaticAuthorizer {
        async fn can_escalate(
            &self,
            _user: &UserInfo,
            _gvr: &GroupVersionResource,
            _namespace: Option<&str>,
        ) -> Result<bool, AuthorizerError> {
            match self.0 {
                Ok(verdict) => Ok(verdict),
                Err(()) => Err(AuthorizerError::Kube(kube::Error::Api(
                    kube::core::ErrorResponse {
                        status: "Failure".to_string(),
                        message: "authorization server unavailable".to_string(),
                        reason: "InternalError".to_string(),
                        code: 500,
                    },
                ))),
            }
        }
    }

    /// Resolver returning the same rule set for every requester.
    pub struct StaticResolver(pub Vec<PolicyRule>);

    impl RuleResolver for StaticResolver {
        fn rules_for(
            &self,
            _user: &UserInfo,
            _namespace: Option<&str>,
        ) -> Result<Vec<PolicyRule>, ResolveError> {
            Ok(self.0.clone())
        }
    }

    pub fn checker(
        authorizer: StaticAuthorizer,
        resolver: StaticResolver,
    ) -> EscalationChecker {
        EscalationChecker::new(
            Arc::new(authorizer),
            Arc::new(resolver),
            GroupVersionResource::gvr(
                crate::crd::API_GROUP,
                crate::crd::API_VERSION,
                "globalrolebindings",
            ),
        )
    }
}
