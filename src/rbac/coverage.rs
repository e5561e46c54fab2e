//! Policy-rule coverage algebra.
//!
//! `covers` decides whether a set of grantor rules already grants everything
//! a requested rule would grant. This is the primitive the escalation checker
//! is built on: a requester may only hand out permissions whose rules are
//! covered by the rules they hold themselves.

use k8s_openapi::api::rbac::v1::PolicyRule;

/// Wildcard marker matching every value of a rule field.
pub const WILDCARD: &str = "*";

/// True if some rule in `grantor` covers the requested rule.
pub fn covers(grantor: &[PolicyRule], wanted: &PolicyRule) -> bool {
    grantor.iter().any(|rule| rule_covers(rule, wanted))
}

/// Requested rules not covered by any grantor rule, in request order.
pub fn uncovered<'a>(grantor: &[PolicyRule], wanted: &'a [PolicyRule]) -> Vec<&'a PolicyRule> {
    wanted.iter().filter(|rule| !covers(grantor, rule)).collect()
}

/// Compact single-line rendering of a rule for denial diagnostics.
pub fn format_rule(rule: &PolicyRule) -> String {
    if is_non_resource(rule) {
        return format!(
            "nonResourceURLs={:?} verbs={:?}",
            rule.non_resource_urls.as_deref().unwrap_or_default(),
            rule.verbs,
        );
    }
    let mut out = format!(
        "apiGroups={:?} resources={:?} verbs={:?}",
        rule.api_groups.as_deref().unwrap_or_default(),
        rule.resources.as_deref().unwrap_or_default(),
        rule.verbs,
    );
    if let Some(names) = rule.resource_names.as_deref() {
        if !names.is_empty() {
            out.push_str(&format!(" resourceNames={names:?}"));
        }
    }
    out
}

fn is_non_resource(rule: &PolicyRule) -> bool {
    rule.non_resource_urls
        .as_deref()
        .is_some_and(|urls| !urls.is_empty())
}

fn rule_covers(grantor: &PolicyRule, wanted: &PolicyRule) -> bool {
    // Non-resource rules form their own lattice: only the URL and verb sets
    // participate in the comparison.
    if is_non_resource(wanted) {
        return urls_cover(
            grantor.non_resource_urls.as_deref(),
            wanted.non_resource_urls.as_deref(),
        ) && set_covers(Some(&grantor.verbs), Some(&wanted.verbs));
    }
    if is_non_resource(grantor) {
        return false;
    }
    set_covers(grantor.api_groups.as_deref(), wanted.api_groups.as_deref())
        && set_covers(grantor.resources.as_deref(), wanted.resources.as_deref())
        && set_covers(
            grantor.resource_names.as_deref(),
            wanted.resource_names.as_deref(),
        )
        && set_covers(Some(&grantor.verbs), Some(&wanted.verbs))
}

/// A grantor field covers a wanted field when it holds the wildcard or
/// contains every wanted value. An empty grantor list grants no values; an
/// empty wanted list asks for none.
fn set_covers(grantor: Option<&[String]>, wanted: Option<&[String]>) -> bool {
    let wanted = wanted.unwrap_or_default();
    if wanted.is_empty() {
        return true;
    }
    let grantor = grantor.unwrap_or_default();
    if grantor.iter().any(|value| value == WILDCARD) {
        return true;
    }
    wanted.iter().all(|value| grantor.contains(value))
}

fn urls_cover(grantor: Option<&[String]>, wanted: Option<&[String]>) -> bool {
    let wanted = wanted.unwrap_or_default();
    let grantor = grantor.unwrap_or_default();
    wanted
        .iter()
        .all(|url| grantor.iter().any(|held| url_covers(held, url)))
}

/// A held URL covers a requested URL exactly, via the bare wildcard, or via a
/// trailing `/*` prefix segment (`/apis/*` covers `/apis/batch`).
fn url_covers(held: &str, wanted: &str) -> bool {
    if held == WILDCARD || held == wanted {
        return true;
    }
    held.strip_suffix(WILDCARD)
        .is_some_and(|prefix| wanted.starts_with(prefix))
}
