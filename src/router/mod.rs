//! # Channel Router
//!
//! Chooses the destination endpoint for a matched rule. The cascade is
//! deterministic, first match wins, no randomness:
//!
//! 1. rule-pinned endpoint (if still active)
//! 2. value thresholds (executive / manager vocabularies)
//! 3. probability threshold (urgent vocabulary)
//! 4. event category (wins / lost / leads vocabularies)
//! 5. time of day (after-hours vocabulary)
//! 6. owner-specific tag (`user-{id}` / `owner-{id}`)
//! 7. rule default endpoint, else first active endpoint, else none
//!
//! Keyword matching is case-insensitive substring search over endpoint
//! name + description against the fixed vocabularies below.

use crate::events::CrmEvent;
use crate::matcher::alias;
use crate::models::{ChannelEndpoint, Rule};
use chrono::Timelike;

/// Deal value at or above which the executive vocabulary applies
pub const HIGH_VALUE_THRESHOLD: f64 = 50_000.0;
/// Deal value at or above which the manager vocabulary applies
pub const MEDIUM_VALUE_THRESHOLD: f64 = 10_000.0;
/// Win probability (percent) at or above which the urgent vocabulary applies
pub const HOT_PROBABILITY_THRESHOLD: f64 = 90.0;
/// Business hours window for the after-hours step (inclusive start, exclusive end)
pub const BUSINESS_HOURS: (u32, u32) = (9, 18);

const EXECUTIVE_KEYWORDS: &[&str] = &["executive", "vip", "high-value", "leadership"];
const MANAGER_KEYWORDS: &[&str] = &["manager", "sales-manager", "medium-value"];
const URGENT_KEYWORDS: &[&str] = &["urgent", "closing", "hot-deals"];
const WINS_KEYWORDS: &[&str] = &["wins", "celebrations"];
const LOST_KEYWORDS: &[&str] = &["lost-deals", "analysis"];
const LEADS_KEYWORDS: &[&str] = &["leads", "new-business"];
const AFTER_HOURS_KEYWORDS: &[&str] = &["alerts", "24-7", "after-hours"];

/// Pick the endpoint for this event under this rule, or `None` when the
/// tenant has nowhere to send at all
pub fn route<'a>(
    event: &CrmEvent,
    rule: &Rule,
    endpoints: &'a [ChannelEndpoint],
) -> Option<&'a ChannelEndpoint> {
    // 1. Rule-pinned endpoint wins outright while it is active
    if let Some(pinned) = rule.pinned_endpoint_id {
        if let Some(endpoint) = find_active(endpoints, pinned) {
            return Some(endpoint);
        }
    }

    // 2. Value thresholds
    if let Some(value) = event.value() {
        if value >= HIGH_VALUE_THRESHOLD {
            if let Some(endpoint) = find_tagged(endpoints, EXECUTIVE_KEYWORDS) {
                return Some(endpoint);
            }
        }
        if value >= MEDIUM_VALUE_THRESHOLD {
            if let Some(endpoint) = find_tagged(endpoints, MANAGER_KEYWORDS) {
                return Some(endpoint);
            }
        }
    }

    // 3. Probability threshold
    if let Some(probability) = event.probability() {
        if probability >= HOT_PROBABILITY_THRESHOLD {
            if let Some(endpoint) = find_tagged(endpoints, URGENT_KEYWORDS) {
                return Some(endpoint);
            }
        }
    }

    // 4. Event category
    if let Some(keywords) = category_keywords(&event.event_type) {
        if let Some(endpoint) = find_tagged(endpoints, keywords) {
            return Some(endpoint);
        }
    }

    // 5. Outside business hours
    let hour = event.occurred_at.hour();
    if hour < BUSINESS_HOURS.0 || hour >= BUSINESS_HOURS.1 {
        if let Some(endpoint) = find_tagged(endpoints, AFTER_HOURS_KEYWORDS) {
            return Some(endpoint);
        }
    }

    // 6. Owner-specific tag
    if let Some(owner_id) = event.owner_id() {
        let user_tag = format!("user-{owner_id}");
        let owner_tag = format!("owner-{owner_id}");
        if let Some(endpoint) = endpoints.iter().find(|e| {
            let text = e.routing_text();
            text.contains(&user_tag) || text.contains(&owner_tag)
        }) {
            return Some(endpoint);
        }
    }

    // 7. Fallbacks: rule default, then first active endpoint
    if let Some(default_id) = rule.default_endpoint_id {
        if let Some(endpoint) = find_active(endpoints, default_id) {
            return Some(endpoint);
        }
    }
    endpoints.iter().find(|e| e.active)
}

/// The category vocabulary for an event type, if it belongs to one
fn category_keywords(event_type: &str) -> Option<&'static [&'static str]> {
    let canonical = alias::canonicalize(event_type).unwrap_or(event_type);
    let action = canonical.split('.').nth(1)?;
    match action {
        "won" => Some(WINS_KEYWORDS),
        "lost" => Some(LOST_KEYWORDS),
        "added" | "created" => Some(LEADS_KEYWORDS),
        _ => None,
    }
}

fn find_active(endpoints: &[ChannelEndpoint], endpoint_id: i64) -> Option<&ChannelEndpoint> {
    endpoints
        .iter()
        .find(|e| e.endpoint_id == endpoint_id && e.active)
}

fn find_tagged<'a>(
    endpoints: &'a [ChannelEndpoint],
    keywords: &[&str],
) -> Option<&'a ChannelEndpoint> {
    endpoints.iter().find(|e| {
        if !e.active {
            return false;
        }
        let text = e.routing_text();
        keywords.iter().any(|kw| text.contains(kw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn endpoint(id: i64, name: &str) -> ChannelEndpoint {
        ChannelEndpoint {
            endpoint_id: id,
            tenant_id: 1,
            address: format!("#chan-{id}"),
            name: name.to_string(),
            description: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn rule() -> Rule {
        Rule {
            rule_id: 1,
            tenant_id: 1,
            event_pattern: "deal.*".to_string(),
            priority: 100,
            enabled: true,
            filters: None,
            pinned_endpoint_id: None,
            default_endpoint_id: None,
            render_mode: "text".to_string(),
            created_at: Utc::now(),
        }
    }

    fn business_hours_event(event_type: &str, object: serde_json::Value) -> CrmEvent {
        let mut event = CrmEvent::new(event_type, object);
        event.occurred_at = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
        event
    }

    #[test]
    fn test_high_value_deal_routes_to_executive_over_default() {
        let endpoints = vec![endpoint(1, "General"), endpoint(2, "Executive Deals")];
        let mut rule = rule();
        rule.default_endpoint_id = Some(1);

        let event = business_hours_event(
            "deal.won",
            json!({ "id": 7, "value": 75000.0, "currency": "USD" }),
        );
        let chosen = route(&event, &rule, &endpoints).unwrap();
        assert_eq!(chosen.endpoint_id, 2);
    }

    #[test]
    fn test_pinned_endpoint_beats_everything() {
        let endpoints = vec![endpoint(1, "Executive"), endpoint(2, "Pinned Channel")];
        let mut rule = rule();
        rule.pinned_endpoint_id = Some(2);

        let event = business_hours_event("deal.won", json!({ "id": 7, "value": 75000.0 }));
        assert_eq!(route(&event, &rule, &endpoints).unwrap().endpoint_id, 2);
    }

    #[test]
    fn test_inactive_pin_falls_through() {
        let mut pinned = endpoint(2, "Pinned Channel");
        pinned.active = false;
        let endpoints = vec![endpoint(1, "General"), pinned];
        let mut rule = rule();
        rule.pinned_endpoint_id = Some(2);

        let event = business_hours_event("deal.updated", json!({ "id": 7 }));
        assert_eq!(route(&event, &rule, &endpoints).unwrap().endpoint_id, 1);
    }

    #[test]
    fn test_medium_value_routes_to_manager() {
        let endpoints = vec![endpoint(1, "General"), endpoint(2, "Sales-Manager Desk")];
        let event = business_hours_event("deal.updated", json!({ "id": 7, "value": 15000.0 }));
        assert_eq!(route(&event, &rule(), &endpoints).unwrap().endpoint_id, 2);
    }

    #[test]
    fn test_hot_probability_routes_to_urgent() {
        let endpoints = vec![endpoint(1, "General"), endpoint(2, "Hot-Deals")];
        let event =
            business_hours_event("deal.updated", json!({ "id": 7, "probability": 95 }));
        assert_eq!(route(&event, &rule(), &endpoints).unwrap().endpoint_id, 2);
    }

    #[test]
    fn test_won_event_routes_to_wins_channel() {
        let endpoints = vec![endpoint(1, "General"), endpoint(2, "Celebrations")];
        let event = business_hours_event("deal.won", json!({ "id": 7 }));
        assert_eq!(route(&event, &rule(), &endpoints).unwrap().endpoint_id, 2);
    }

    #[test]
    fn test_after_hours_routes_to_alerts() {
        let endpoints = vec![endpoint(1, "General"), endpoint(2, "After-Hours Alerts")];
        let mut event = CrmEvent::new("deal.updated", json!({ "id": 7 }));
        event.occurred_at = Utc.with_ymd_and_hms(2026, 8, 26, 22, 0, 0).unwrap();
        assert_eq!(route(&event, &rule(), &endpoints).unwrap().endpoint_id, 2);
    }

    #[test]
    fn test_owner_tag_routing() {
        let endpoints = vec![endpoint(1, "General"), endpoint(2, "user-42 pipeline")];
        let event = business_hours_event("deal.updated", json!({ "id": 7, "owner_id": 42 }));
        assert_eq!(route(&event, &rule(), &endpoints).unwrap().endpoint_id, 2);
    }

    #[test]
    fn test_fallback_to_rule_default_then_first_active() {
        let endpoints = vec![endpoint(1, "General"), endpoint(2, "Second")];
        let event = business_hours_event("deal.updated", json!({ "id": 7 }));

        let mut with_default = rule();
        with_default.default_endpoint_id = Some(2);
        assert_eq!(route(&event, &with_default, &endpoints).unwrap().endpoint_id, 2);

        assert_eq!(route(&event, &rule(), &endpoints).unwrap().endpoint_id, 1);
    }

    #[test]
    fn test_no_endpoints_routes_nowhere() {
        let event = business_hours_event("deal.updated", json!({ "id": 7 }));
        assert!(route(&event, &rule(), &[]).is_none());

        let mut inactive = endpoint(1, "General");
        inactive.active = false;
        assert!(route(&event, &rule(), &[inactive]).is_none());
    }
}
