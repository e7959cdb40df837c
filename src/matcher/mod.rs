//! # Rule Matching
//!
//! Finds the enabled rules that apply to an inbound event and evaluates
//! their filter predicates.
//!
//! Event-type matching is a cascade: exact string match, then canonical
//! alias groups (the static table in [`alias`]), then the `entity.*`
//! wildcard, then the bare entity name. Rules come back ordered by priority
//! then creation time — the store guarantees the ordering, this module
//! guarantees the cascade.

pub mod alias;
pub mod filter;

use crate::error::Result;
use crate::events::CrmEvent;
use crate::models::Rule;
use crate::store::DeliveryStore;

pub use filter::FilterSet;

/// Whether a rule's pattern matches an event type, per the cascade
pub fn pattern_matches(pattern: &str, event_type: &str) -> bool {
    // 1. Exact match
    if pattern == event_type {
        return true;
    }

    // 2. Canonical alias groups: both sides normalize to the same taxonomy entry
    if let (Some(canonical_pattern), Some(canonical_event)) =
        (alias::canonicalize(pattern), alias::canonicalize(event_type))
    {
        if canonical_pattern == canonical_event {
            return true;
        }
    }

    // 3. Wildcard: `deal.*` matches every deal event
    if let Some(entity) = pattern.strip_suffix(".*") {
        if entity_of(event_type) == Some(entity) {
            return true;
        }
    }

    // 4. Bare entity name: pattern `deal` matches `deal.won`
    if !pattern.contains('.') && entity_of(event_type) == Some(pattern) {
        return true;
    }

    false
}

fn entity_of(event_type: &str) -> Option<&str> {
    event_type.split('.').next().filter(|s| !s.is_empty())
}

/// Enabled rules for a tenant whose pattern matches the event, in priority order
pub async fn find_rules(
    store: &dyn DeliveryStore,
    tenant_id: i64,
    event_type: &str,
) -> Result<Vec<Rule>> {
    let rules = store.enabled_rules(tenant_id).await?;
    Ok(rules
        .into_iter()
        .filter(|rule| pattern_matches(&rule.event_pattern, event_type))
        .collect())
}

/// Evaluate a rule's filters against an event (pure; see `filter`)
pub fn applies_to(rule: &Rule, event: &CrmEvent, fail_open: bool) -> bool {
    filter::evaluate(rule.filters.as_ref(), event, fail_open)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(pattern_matches("deal.won", "deal.won"));
        assert!(!pattern_matches("deal.won", "deal.lost"));
    }

    #[test]
    fn test_alias_group_match() {
        // create/added are one canonical group
        assert!(pattern_matches("deal.added", "deal.create"));
        assert!(pattern_matches("person.created", "person.added"));
        // won and lost never alias each other
        assert!(!pattern_matches("deal.won", "deal.lost"));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(pattern_matches("deal.*", "deal.won"));
        assert!(pattern_matches("deal.*", "deal.updated"));
        assert!(!pattern_matches("deal.*", "person.added"));
    }

    #[test]
    fn test_bare_entity_match() {
        assert!(pattern_matches("deal", "deal.won"));
        assert!(!pattern_matches("deal", "person.added"));
    }
}
