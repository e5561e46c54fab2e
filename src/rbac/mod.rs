//! Privilege-escalation resolution engine.
//!
//! Pure rule algebra (`coverage`), template and global-role resolution over
//! read-only caches (`templates`, `global_roles`), effective-rule resolution
//! for a requester (`resolver`), and the two-tier escalation check that ties
//! them together (`escalation`).

pub mod coverage;
pub mod escalation;
pub mod global_roles;
pub mod resolver;
pub mod templates;

pub use coverage::{covers, uncovered};
pub use escalation::{EscalationChecker, EscalationDecision};
pub use templates::{ResolveError, RoleTemplateStore, resolve_template};
