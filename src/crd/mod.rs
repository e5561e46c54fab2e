//! Custom Resource Definitions for the Steward management API.
//!
//! - `RoleTemplate`: reusable, inheritable bundle of RBAC policy rules
//! - `GlobalRole`: non-namespaced role, optionally conferring cluster rules
//! - `GlobalRoleBinding`: grants a GlobalRole to a user or group

mod global_role;
mod global_role_binding;
mod role_template;

pub use global_role::*;
pub use global_role_binding::*;
pub use role_template::*;

/// API group of all Steward management resources.
pub const API_GROUP: &str = "management.steward.io";

/// API version served by this webhook.
pub const API_VERSION: &str = "v1";
