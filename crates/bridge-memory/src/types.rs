//! The memory record and its partial updates.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single global memory record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryRecord {
    /// Trailing slice of the most recent conversation log.
    pub summary: String,
    /// How the user asked to be addressed.
    pub user_name: Option<String>,
    /// Standing corrections, deduplicated.
    pub rules: BTreeSet<String>,
    /// Time of the last write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    /// Nothing worth recalling.
    pub fn is_blank(&self) -> bool {
        self.summary.trim().is_empty()
            && self.user_name.as_deref().is_none_or(|n| n.trim().is_empty())
            && self.rules.is_empty()
    }
}

/// A set-valued field that supports atomic, idempotent appends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetField {
    /// [`MemoryRecord::rules`].
    Rules,
}

impl SetField {
    /// Field name as written on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rules => "rules",
        }
    }
}

/// Partial update of a [`MemoryRecord`].
///
/// `None` leaves a field alone when merging. `user_name: Some(None)` clears
/// the name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryPatch {
    /// New summary.
    pub summary: Option<String>,
    /// New name, or `Some(None)` to clear it.
    pub user_name: Option<Option<String>>,
    /// Replacement rule set.
    pub rules: Option<BTreeSet<String>>,
    /// Write timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemoryPatch {
    /// Record a confirmed name.
    pub fn user_name(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_name: Some(Some(name.into())),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Replace the running summary.
    pub fn summary(summary: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            summary: Some(summary.into()),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Every field reset. Meant to be written with `merge = false`.
    pub fn cleared(now: DateTime<Utc>) -> Self {
        Self {
            summary: Some(String::new()),
            user_name: Some(None),
            rules: Some(BTreeSet::new()),
            updated_at: Some(now),
        }
    }

    /// Also set the name (builder style).
    #[must_use]
    pub fn with_user_name(mut self, name: Option<String>) -> Self {
        if let Some(name) = name {
            self.user_name = Some(Some(name));
        }
        self
    }

    /// Apply onto `base`. With `merge = false` the base is discarded first.
    pub fn apply(self, base: Option<MemoryRecord>, merge: bool) -> MemoryRecord {
        let mut record = if merge {
            base.unwrap_or_default()
        } else {
            MemoryRecord::default()
        };
        if let Some(summary) = self.summary {
            record.summary = summary;
        }
        if let Some(user_name) = self.user_name {
            record.user_name = user_name;
        }
        if let Some(rules) = self.rules {
            record.rules = rules;
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = Some(updated_at);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing() -> MemoryRecord {
        MemoryRecord {
            summary: "old".into(),
            user_name: Some("Alex".into()),
            rules: BTreeSet::from(["speak slowly".to_string()]),
            updated_at: None,
        }
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let now = Utc::now();
        let record = MemoryPatch::summary("new", now).apply(Some(existing()), true);
        assert_eq!(record.summary, "new");
        assert_eq!(record.user_name.as_deref(), Some("Alex"));
        assert_eq!(record.rules.len(), 1);
        assert_eq!(record.updated_at, Some(now));
    }

    #[test]
    fn replace_discards_base() {
        let record = MemoryPatch::summary("new", Utc::now()).apply(Some(existing()), false);
        assert_eq!(record.user_name, None);
        assert!(record.rules.is_empty());
    }

    #[test]
    fn cleared_resets_everything() {
        let record = MemoryPatch::cleared(Utc::now()).apply(Some(existing()), true);
        assert!(record.is_blank());
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn with_user_name_none_leaves_name_alone() {
        let patch = MemoryPatch::summary("s", Utc::now()).with_user_name(None);
        let record = patch.apply(Some(existing()), true);
        assert_eq!(record.user_name.as_deref(), Some("Alex"));
    }

    #[test]
    fn record_serializes_camel_case() {
        let json = serde_json::to_value(existing()).unwrap();
        assert_eq!(json["userName"], "Alex");
        assert_eq!(json["rules"][0], "speak slowly");
    }

    #[test]
    fn blank_record() {
        assert!(MemoryRecord::default().is_blank());
        assert!(!existing().is_blank());
    }
}
