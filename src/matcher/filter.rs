//! # Filter Predicates
//!
//! Per-rule predicate evaluation. A rule's `filters` JSONB deserializes into
//! a [`FilterSet`]; every configured predicate must pass, and an absent
//! predicate always passes. Evaluation is a pure function of the event and
//! the parsed set.
//!
//! An unparsable filter configuration follows the `fail_open` policy flag:
//! when open (the default, preserving historical behavior) the rule matches
//! and a warning is logged; when closed the rule rejects.

use crate::events::CrmEvent;
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// The full predicate set a rule may configure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    pub value_min: Option<f64>,
    pub value_max: Option<f64>,
    pub probability_min: Option<f64>,
    pub probability_max: Option<f64>,
    pub stages: Option<Vec<String>>,
    pub pipelines: Option<Vec<String>>,
    pub owners: Option<Vec<String>>,
    pub currencies: Option<Vec<String>>,
    pub labels: Option<LabelFilter>,
    pub time_window: Option<TimeWindow>,
}

/// Label-set predicate with any/all semantics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelFilter {
    #[serde(default)]
    pub mode: LabelMode,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    /// At least one configured label present on the object
    #[default]
    Any,
    /// Every configured label present on the object
    All,
}

/// Time-of-day plus weekday window, evaluated against the event timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start, "HH:MM"
    pub start: String,
    /// Exclusive end, "HH:MM"
    pub end: String,
    /// ISO weekday numbers (Monday = 1 .. Sunday = 7); absent means every day
    pub weekdays: Option<Vec<u32>>,
}

/// Evaluate a rule's raw filter configuration against an event
pub fn evaluate(filters: Option<&Value>, event: &CrmEvent, fail_open: bool) -> bool {
    let raw = match filters {
        None | Some(Value::Null) => return true,
        Some(raw) => raw,
    };

    let set: FilterSet = match serde_json::from_value(raw.clone()) {
        Ok(set) => set,
        Err(e) => {
            warn!(
                event_type = %event.event_type,
                error = %e,
                fail_open = fail_open,
                "Unparsable filter configuration"
            );
            return fail_open;
        }
    };

    evaluate_set(&set, event)
}

/// Evaluate an already-parsed predicate set
pub fn evaluate_set(set: &FilterSet, event: &CrmEvent) -> bool {
    range_passes(set.value_min, set.value_max, event.value())
        && range_passes(set.probability_min, set.probability_max, event.probability())
        && membership_passes(set.stages.as_deref(), event.stage_id())
        && membership_passes(set.pipelines.as_deref(), event.pipeline_id())
        && membership_passes(set.owners.as_deref(), event.owner_id())
        && membership_passes(
            set.currencies.as_deref(),
            event.currency().map(str::to_string),
        )
        && labels_pass(set.labels.as_ref(), &event.labels())
        && window_passes(set.time_window.as_ref(), event)
}

fn range_passes(min: Option<f64>, max: Option<f64>, actual: Option<f64>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(actual) = actual else {
        return false;
    };
    if let Some(min) = min {
        if actual < min {
            return false;
        }
    }
    if let Some(max) = max {
        if actual > max {
            return false;
        }
    }
    true
}

fn membership_passes(allowed: Option<&[String]>, actual: Option<String>) -> bool {
    match allowed {
        None => true,
        Some([]) => true,
        Some(allowed) => match actual {
            Some(actual) => allowed.iter().any(|a| *a == actual),
            None => false,
        },
    }
}

fn labels_pass(filter: Option<&LabelFilter>, actual: &[String]) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    if filter.values.is_empty() {
        return true;
    }
    match filter.mode {
        LabelMode::Any => filter.values.iter().any(|v| actual.contains(v)),
        LabelMode::All => filter.values.iter().all(|v| actual.contains(v)),
    }
}

fn window_passes(window: Option<&TimeWindow>, event: &CrmEvent) -> bool {
    let Some(window) = window else {
        return true;
    };

    if let Some(weekdays) = &window.weekdays {
        if !weekdays.is_empty() {
            let weekday = event.occurred_at.weekday().number_from_monday();
            if !weekdays.contains(&weekday) {
                return false;
            }
        }
    }

    let (Some(start), Some(end)) = (parse_hhmm(&window.start), parse_hhmm(&window.end)) else {
        // Malformed window strings follow the same fail-open doctrine the
        // caller applied at parse time; here the set parsed, so pass.
        return true;
    };

    let minute_of_day = event.occurred_at.hour() * 60 + event.occurred_at.minute();
    if start <= end {
        minute_of_day >= start && minute_of_day < end
    } else {
        // Overnight window, e.g. 22:00 - 06:00
        minute_of_day >= start || minute_of_day < end
    }
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn deal(value: f64) -> CrmEvent {
        CrmEvent::new("deal.updated", json!({ "id": 1, "value": value }))
    }

    #[test]
    fn test_value_range() {
        let filters = json!({ "value_min": 10000.0, "value_max": 50000.0 });
        assert!(evaluate(Some(&filters), &deal(30000.0), true));
        assert!(!evaluate(Some(&filters), &deal(5000.0), true));
        assert!(!evaluate(Some(&filters), &deal(60000.0), true));
        // Boundaries are inclusive
        assert!(evaluate(Some(&filters), &deal(10000.0), true));
        assert!(evaluate(Some(&filters), &deal(50000.0), true));
    }

    #[test]
    fn test_configured_range_rejects_event_without_value() {
        let filters = json!({ "value_min": 100.0 });
        let event = CrmEvent::new("person.added", json!({ "id": 1 }));
        assert!(!evaluate(Some(&filters), &event, true));
    }

    #[test]
    fn test_absent_predicates_pass() {
        assert!(evaluate(None, &deal(1.0), true));
        assert!(evaluate(Some(&Value::Null), &deal(1.0), true));
        assert!(evaluate(Some(&json!({})), &deal(1.0), true));
    }

    #[test]
    fn test_set_membership() {
        let filters = json!({ "stages": ["3", "4"], "currencies": ["USD"] });
        let event = CrmEvent::new(
            "deal.updated",
            json!({ "id": 1, "stage_id": 3, "currency": "USD" }),
        );
        assert!(evaluate(Some(&filters), &event, true));

        let wrong_stage = CrmEvent::new(
            "deal.updated",
            json!({ "id": 1, "stage_id": 9, "currency": "USD" }),
        );
        assert!(!evaluate(Some(&filters), &wrong_stage, true));
    }

    #[test]
    fn test_labels_any_vs_all() {
        let event = CrmEvent::new("deal.updated", json!({ "id": 1, "label_ids": [1, 2] }));

        let any = json!({ "labels": { "mode": "any", "values": ["2", "9"] } });
        assert!(evaluate(Some(&any), &event, true));

        let all = json!({ "labels": { "mode": "all", "values": ["2", "9"] } });
        assert!(!evaluate(Some(&all), &event, true));

        let all_present = json!({ "labels": { "mode": "all", "values": ["1", "2"] } });
        assert!(evaluate(Some(&all_present), &event, true));
    }

    #[test]
    fn test_time_window() {
        let filters = json!({ "time_window": { "start": "09:00", "end": "18:00" } });
        let mut event = deal(1.0);

        event.occurred_at = chrono::Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
        assert!(evaluate(Some(&filters), &event, true));

        event.occurred_at = chrono::Utc.with_ymd_and_hms(2026, 8, 26, 20, 0, 0).unwrap();
        assert!(!evaluate(Some(&filters), &event, true));
    }

    #[test]
    fn test_weekday_window() {
        // 2026-08-26 is a Wednesday (ISO weekday 3)
        let filters = json!({
            "time_window": { "start": "00:00", "end": "23:59", "weekdays": [1, 2, 3, 4, 5] }
        });
        let mut event = deal(1.0);
        event.occurred_at = chrono::Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
        assert!(evaluate(Some(&filters), &event, true));

        // 2026-08-30 is a Sunday
        event.occurred_at = chrono::Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        assert!(!evaluate(Some(&filters), &event, true));
    }

    #[test]
    fn test_overnight_window_wraps() {
        let filters = json!({ "time_window": { "start": "22:00", "end": "06:00" } });
        let mut event = deal(1.0);

        event.occurred_at = chrono::Utc.with_ymd_and_hms(2026, 8, 26, 23, 30, 0).unwrap();
        assert!(evaluate(Some(&filters), &event, true));

        event.occurred_at = chrono::Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
        assert!(!evaluate(Some(&filters), &event, true));
    }

    #[test]
    fn test_unparsable_filter_follows_policy() {
        let garbage = json!({ "value_min": "not a number" });
        assert!(evaluate(Some(&garbage), &deal(1.0), true));
        assert!(!evaluate(Some(&garbage), &deal(1.0), false));
    }

    proptest! {
        #[test]
        fn prop_range_accepts_exactly_in_bounds(value in -1e9f64..1e9f64) {
            let filters = json!({ "value_min": 10000.0, "value_max": 50000.0 });
            let expected = (10000.0..=50000.0).contains(&value);
            prop_assert_eq!(evaluate(Some(&filters), &deal(value), true), expected);
        }
    }
}
