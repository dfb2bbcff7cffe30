//! Memory updates derived from the transcript.

use bridge_memory::{MemoryPatch, MemoryStore, SetField};
use chrono::Utc;

/// One memory update. Applying it is a single store call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryMutation {
    /// A newly confirmed name (merge).
    SetName(String),
    /// A newly confirmed correction rule (set append).
    AppendRule(String),
    /// Periodic summary of the recent log (merge).
    Autosave {
        /// Trailing slice of the log.
        summary: String,
    },
    /// Reset summary, name and rules (replace).
    Wipe,
    /// End-of-session merge.
    Final {
        /// Trailing slice of the log.
        summary: String,
        /// Name found in the whole log, if any. `None` keeps the stored name.
        user_name: Option<String>,
    },
}

impl MemoryMutation {
    /// Short name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetName(_) => "set_name",
            Self::AppendRule(_) => "append_rule",
            Self::Autosave { .. } => "autosave",
            Self::Wipe => "wipe",
            Self::Final { .. } => "final",
        }
    }

    /// Write this mutation to `store` under `key`.
    pub async fn apply(self, store: &dyn MemoryStore, key: &str) -> bridge_memory::Result<()> {
        let now = Utc::now();
        match self {
            Self::SetName(name) => store.set(key, MemoryPatch::user_name(name, now), true).await,
            Self::AppendRule(rule) => store.append_to_set(key, SetField::Rules, &rule).await,
            Self::Autosave { summary } => store.set(key, MemoryPatch::summary(summary, now), true).await,
            Self::Wipe => store.set(key, MemoryPatch::cleared(now), false).await,
            Self::Final { summary, user_name } => {
                let patch = MemoryPatch::summary(summary, now).with_user_name(user_name);
                store.set(key, patch, true).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bridge_memory::InMemoryStore;

    use super::*;

    #[tokio::test]
    async fn final_without_name_keeps_stored_name() {
        let store = InMemoryStore::new();
        MemoryMutation::SetName("Alex".into())
            .apply(&store, "k")
            .await
            .unwrap();
        MemoryMutation::Final {
            summary: "bye".into(),
            user_name: None,
        }
        .apply(&store, "k")
        .await
        .unwrap();

        let record = store.get("k").await.unwrap().unwrap();
        assert_eq!(record.user_name.as_deref(), Some("Alex"));
        assert_eq!(record.summary, "bye");
    }

    #[tokio::test]
    async fn wipe_after_rules_reads_back_cleared() {
        let store = InMemoryStore::new();
        for mutation in [
            MemoryMutation::SetName("Alex".into()),
            MemoryMutation::AppendRule("no slang".into()),
            MemoryMutation::Autosave {
                summary: "log".into(),
            },
            MemoryMutation::Wipe,
        ] {
            mutation.apply(&store, "k").await.unwrap();
        }
        let record = store.get("k").await.unwrap().unwrap();
        assert!(record.is_blank());
    }

    #[test]
    fn kinds_are_snake_case() {
        assert_eq!(MemoryMutation::Wipe.kind(), "wipe");
        assert_eq!(MemoryMutation::AppendRule(String::new()).kind(), "append_rule");
    }
}
