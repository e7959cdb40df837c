//! # Inbound CRM Events
//!
//! The opaque lifecycle event received from the CRM. The payload shape is
//! externally defined; this module provides typed accessors over the JSON
//! object so matching, filtering, and routing never touch raw keys inline.
//!
//! Events optionally carry `current`/`previous` diffs. Accessors prefer the
//! `current` snapshot when present and fall back to the flat object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An inbound CRM lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmEvent {
    /// Event type string as sent by the CRM, e.g. `deal.won`, `lead.added`
    pub event_type: String,
    /// External company identifier, when the CRM supplies one
    pub company_id: Option<String>,
    /// External user identifier, when the CRM supplies one
    pub user_id: Option<String>,
    /// Object payload; may contain a `current` snapshot and a `previous` diff
    pub object: Value,
    /// When the event occurred upstream
    pub occurred_at: DateTime<Utc>,
}

impl CrmEvent {
    /// Construct an event with an occurrence time of now
    pub fn new(event_type: impl Into<String>, object: Value) -> Self {
        Self {
            event_type: event_type.into(),
            company_id: None,
            user_id: None,
            object,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_company_id(mut self, company_id: impl Into<String>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// The `current` snapshot if present, otherwise the flat object
    fn current(&self) -> &Value {
        self.object.get("current").unwrap_or(&self.object)
    }

    fn field(&self, key: &str) -> Option<&Value> {
        self.current().get(key).or_else(|| self.object.get(key))
    }

    /// Object identifier, stringified (CRMs send both numbers and strings)
    pub fn object_id(&self) -> Option<String> {
        self.field("id").map(json_to_id)
    }

    /// Monetary value of the object, if any
    pub fn value(&self) -> Option<f64> {
        self.field("value").and_then(Value::as_f64)
    }

    /// Win probability in percent (0-100)
    pub fn probability(&self) -> Option<f64> {
        self.field("probability").and_then(Value::as_f64)
    }

    pub fn currency(&self) -> Option<&str> {
        self.field("currency").and_then(Value::as_str)
    }

    pub fn stage_id(&self) -> Option<String> {
        self.field("stage_id").map(json_to_id)
    }

    pub fn pipeline_id(&self) -> Option<String> {
        self.field("pipeline_id").map(json_to_id)
    }

    /// Owner of the object; CRMs send either `owner_id` or `user_id`
    pub fn owner_id(&self) -> Option<String> {
        self.field("owner_id")
            .or_else(|| self.field("user_id"))
            .map(json_to_id)
    }

    /// Label ids attached to the object
    pub fn labels(&self) -> Vec<String> {
        match self.field("label_ids").or_else(|| self.field("labels")) {
            Some(Value::Array(items)) => items.iter().map(json_to_id).collect(),
            Some(other) => vec![json_to_id(other)],
            None => Vec::new(),
        }
    }

    /// The `previous` diff, when the CRM sent one
    pub fn previous(&self) -> Option<&Value> {
        self.object.get("previous")
    }
}

fn json_to_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors_prefer_current_snapshot() {
        let event = CrmEvent::new(
            "deal.updated",
            json!({
                "id": 7,
                "current": { "id": 7, "value": 75000.0, "currency": "USD", "probability": 90 },
                "previous": { "value": 50000.0 }
            }),
        );

        assert_eq!(event.object_id().as_deref(), Some("7"));
        assert_eq!(event.value(), Some(75000.0));
        assert_eq!(event.currency(), Some("USD"));
        assert_eq!(event.probability(), Some(90.0));
        assert!(event.previous().is_some());
    }

    #[test]
    fn test_flat_object_fallback() {
        let event = CrmEvent::new(
            "deal.won",
            json!({ "id": "abc", "value": 30000, "owner_id": 12, "label_ids": [1, 2] }),
        );

        assert_eq!(event.object_id().as_deref(), Some("abc"));
        assert_eq!(event.value(), Some(30000.0));
        assert_eq!(event.owner_id().as_deref(), Some("12"));
        assert_eq!(event.labels(), vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_missing_fields_are_none() {
        let event = CrmEvent::new("person.added", json!({ "id": 1 }));
        assert_eq!(event.value(), None);
        assert_eq!(event.probability(), None);
        assert!(event.labels().is_empty());
    }
}
