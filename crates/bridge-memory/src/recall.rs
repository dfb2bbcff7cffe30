//! Memory recovery at session setup.

use std::fmt::Write as _;

use tracing::{debug, info, warn};

use crate::store::MemoryStore;
use crate::types::MemoryRecord;

/// Result of a best-effort recovery.
#[derive(Clone, Debug, Default)]
pub struct Recovered {
    /// The stored record, when one was read.
    pub record: Option<MemoryRecord>,
    /// Instruction text to append to the setup frame.
    pub clause: Option<String>,
}

impl Recovered {
    /// Name known from the previous sessions.
    pub fn user_name(&self) -> Option<&str> {
        self.record.as_ref().and_then(|r| r.user_name.as_deref())
    }
}

/// Build the instruction clause for a stored record.
///
/// Returns `None` for a record with nothing in it.
pub fn recall_clause(record: &MemoryRecord) -> Option<String> {
    if record.is_blank() {
        return None;
    }

    let mut clause = format!("\nКОНТЕКСТ ПРОШЛЫХ ВСТРЕЧ: {}", record.summary);
    if let Some(name) = record.user_name.as_deref().filter(|n| !n.trim().is_empty()) {
        let _ = write!(
            clause,
            "\nТВОЕГО НАПАРНИКА ЗОВУТ: {name}. ОБРАЩАЙСЯ К НЕМУ ПО ИМЕНИ. НЕ СПРАШИВАЙ ИМЯ ПОВТОРНО."
        );
    }
    if !record.rules.is_empty() {
        clause.push_str("\n\n[ВАЖНЫЕ ПРАВИЛА И ПОПРАВКИ ОТ НАПАРНИКА]:");
        for rule in &record.rules {
            let _ = write!(clause, "\n- {rule}");
        }
        clause.push_str("\nСОБЛЮДАЙ ЭТИ ПРАВИЛА ВСЕГДА.");
    }
    Some(clause)
}

/// Read the record and build its clause.
///
/// Never fails: a missing store, a missing record, or a store error all yield
/// an empty [`Recovered`].
pub async fn recover(store: Option<&dyn MemoryStore>, key: &str) -> Recovered {
    let Some(store) = store else {
        return Recovered::default();
    };

    match store.get(key).await {
        Ok(Some(record)) => {
            let clause = recall_clause(&record);
            info!(
                key,
                has_name = record.user_name.is_some(),
                rules = record.rules.len(),
                "memory recovered"
            );
            Recovered {
                record: Some(record),
                clause,
            }
        }
        Ok(None) => {
            debug!(key, "no stored memory");
            Recovered::default()
        }
        Err(error) => {
            warn!(key, %error, backend = store.backend(), "memory recovery failed, continuing without memory");
            Recovered::default()
        }
    }
}
