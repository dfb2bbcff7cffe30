//! The memory store interface and the process-local backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::errors::Result;
use crate::types::{MemoryPatch, MemoryRecord, SetField};

/// Async key-value persistence for memory records.
///
/// Every call is fallible and may be slow. Implementations must make `set`
/// with `merge = true` and `append_to_set` atomic per key.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Read a record; `None` when it was never written.
    async fn get(&self, key: &str) -> Result<Option<MemoryRecord>>;

    /// Write `patch`. With `merge` the untouched fields are kept, otherwise the
    /// record is replaced.
    async fn set(&self, key: &str, patch: MemoryPatch, merge: bool) -> Result<()>;

    /// Add `value` to a set-valued field. Adding an existing value is a no-op.
    async fn append_to_set(&self, key: &str, field: SetField, value: &str) -> Result<()>;

    /// Short backend name for logs and the status endpoint.
    fn backend(&self) -> &'static str;
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, MemoryRecord>>,
}

impl InMemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one record.
    pub fn with_record(key: impl Into<String>, record: MemoryRecord) -> Self {
        let store = Self::new();
        let _ = store.records.lock().insert(key.into(), record);
        store
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<MemoryRecord>> {
        Ok(self.records.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, patch: MemoryPatch, merge: bool) -> Result<()> {
        let mut records = self.records.lock();
        let base = records.remove(key);
        let _ = records.insert(key.to_owned(), patch.apply(base, merge));
        Ok(())
    }

    async fn append_to_set(&self, key: &str, field: SetField, value: &str) -> Result<()> {
        let mut records = self.records.lock();
        let record = records.entry(key.to_owned()).or_default();
        match field {
            SetField::Rules => {
                let _ = record.rules.insert(value.to_owned());
            }
        }
        record.updated_at = Some(Utc::now());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
