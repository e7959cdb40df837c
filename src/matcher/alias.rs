//! # Canonical Event Alias Table
//!
//! CRMs emit the same lifecycle moment under several names (`deal.create`
//! vs `deal.added`, `deal.change` vs `deal.updated`). This table is the
//! single, exhaustive mapping from canonical taxonomy entries to their
//! alias sets; matching code never does inline prefix tricks.
//!
//! `validate()` runs at startup and rejects a table where one alias appears
//! in two groups, so a new entry cannot silently change match behavior.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Canonical event taxonomy -> accepted aliases (canonical name included)
const ALIAS_TABLE: &[(&str, &[&str])] = &[
    ("deal.added", &["deal.added", "deal.create", "deal.created", "deal.new"]),
    ("deal.updated", &["deal.updated", "deal.change", "deal.changed"]),
    ("deal.won", &["deal.won", "deal.win"]),
    ("deal.lost", &["deal.lost", "deal.lose"]),
    ("deal.deleted", &["deal.deleted", "deal.delete", "deal.removed"]),
    ("person.added", &["person.added", "person.create", "person.created", "person.new"]),
    ("person.updated", &["person.updated", "person.change", "person.changed"]),
    ("person.deleted", &["person.deleted", "person.delete", "person.removed"]),
    ("organization.added", &[
        "organization.added",
        "organization.create",
        "organization.created",
    ]),
    ("organization.updated", &["organization.updated", "organization.change"]),
    ("organization.deleted", &["organization.deleted", "organization.delete"]),
    ("lead.added", &["lead.added", "lead.create", "lead.created", "lead.new"]),
    ("lead.updated", &["lead.updated", "lead.change"]),
    ("lead.deleted", &["lead.deleted", "lead.delete"]),
    ("activity.added", &["activity.added", "activity.create", "activity.created"]),
    ("activity.updated", &["activity.updated", "activity.change"]),
    ("activity.deleted", &["activity.deleted", "activity.delete"]),
    ("note.added", &["note.added", "note.create", "note.created"]),
];

fn alias_index() -> &'static HashMap<&'static str, &'static str> {
    static INDEX: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut index = HashMap::new();
        for (canonical, aliases) in ALIAS_TABLE {
            for alias in *aliases {
                index.insert(*alias, *canonical);
            }
        }
        index
    })
}

/// The canonical taxonomy entry for an event type, if it is a known alias
pub fn canonicalize(event_type: &str) -> Option<&'static str> {
    alias_index().get(event_type).copied()
}

/// Startup validation: every alias belongs to exactly one group
pub fn validate() -> Result<(), String> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (canonical, aliases) in ALIAS_TABLE {
        for alias in *aliases {
            if let Some(previous) = seen.insert(alias, canonical) {
                return Err(format!(
                    "alias '{alias}' appears in both '{previous}' and '{canonical}'"
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_valid() {
        validate().expect("alias table must have no duplicate aliases");
    }

    #[test]
    fn test_canonicalize_known_aliases() {
        assert_eq!(canonicalize("deal.create"), Some("deal.added"));
        assert_eq!(canonicalize("deal.added"), Some("deal.added"));
        assert_eq!(canonicalize("person.new"), Some("person.added"));
        assert_eq!(canonicalize("deal.win"), Some("deal.won"));
    }

    #[test]
    fn test_unknown_event_types_pass_through() {
        assert_eq!(canonicalize("deal.frobnicated"), None);
        assert_eq!(canonicalize(""), None);
    }

    #[test]
    fn test_won_and_lost_are_distinct_groups() {
        assert_ne!(canonicalize("deal.won"), canonicalize("deal.lost"));
    }
}
