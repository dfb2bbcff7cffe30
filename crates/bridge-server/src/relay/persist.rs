//! Per-session memory writer.

use std::sync::Arc;

use bridge_memory::MemoryStore;
use bridge_transcript::MemoryMutation;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::metrics::MEMORY_WRITE_FAILURES_TOTAL;

/// Applies a session's memory mutations one at a time, in submission order.
///
/// Submitting never blocks the relay. A failed write is logged and dropped;
/// later mutations still run, so a wipe can never be overtaken by an earlier
/// autosave.
pub struct PersistenceWorker {
    tx: mpsc::UnboundedSender<MemoryMutation>,
    task: JoinHandle<()>,
}

impl PersistenceWorker {
    /// Start the writer for `key`.
    pub fn spawn(store: Arc<dyn MemoryStore>, key: String) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(store, key, rx));
        Self { tx, task }
    }

    /// Queue a mutation.
    pub fn submit(&self, mutation: MemoryMutation) {
        if self.tx.send(mutation).is_err() {
            warn!("memory writer stopped, mutation dropped");
        }
    }

    /// Stop accepting work and wait for everything queued to be written.
    pub async fn finish(self) {
        drop(self.tx);
        if let Err(error) = self.task.await {
            warn!(%error, "memory writer task failed");
        }
    }
}

async fn write_loop(
    store: Arc<dyn MemoryStore>,
    key: String,
    mut rx: mpsc::UnboundedReceiver<MemoryMutation>,
) {
    while let Some(mutation) = rx.recv().await {
        let kind = mutation.kind();
        match mutation.apply(store.as_ref(), &key).await {
            Ok(()) => debug!(kind, "memory updated"),
            Err(error) => {
                counter!(MEMORY_WRITE_FAILURES_TOTAL, "kind" => kind).increment(1);
                warn!(kind, %error, backend = store.backend(), "memory write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bridge_logging::capture_logs;
    use bridge_memory::{InMemoryStore, MemoryError, MemoryPatch, MemoryRecord, SetField};
    use tracing::Level;

    use super::*;

    #[tokio::test]
    async fn applies_in_order_and_finishes() {
        let store = Arc::new(InMemoryStore::new());
        let worker = PersistenceWorker::spawn(store.clone(), "k".into());
        worker.submit(MemoryMutation::SetName("Alex".into()));
        worker.submit(MemoryMutation::AppendRule("short answers".into()));
        worker.submit(MemoryMutation::Wipe);
        worker.submit(MemoryMutation::Autosave {
            summary: "after wipe".into(),
        });
        worker.finish().await;

        let record = store.get("k").await.unwrap().unwrap();
        assert_eq!(record.summary, "after wipe");
        assert_eq!(record.user_name, None);
        assert!(record.rules.is_empty());
    }

    struct FailingStore;

    #[async_trait]
    impl MemoryStore for FailingStore {
        async fn get(&self, _key: &str) -> bridge_memory::Result<Option<MemoryRecord>> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _patch: MemoryPatch, _merge: bool) -> bridge_memory::Result<()> {
            Err(MemoryError::Unavailable("read-only".into()))
        }
        async fn append_to_set(
            &self,
            _key: &str,
            _field: SetField,
            _value: &str,
        ) -> bridge_memory::Result<()> {
            Err(MemoryError::Unavailable("read-only".into()))
        }
        fn backend(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn failures_are_logged_and_do_not_stop_the_writer() {
        let (logs, _guard) = capture_logs();
        let worker = PersistenceWorker::spawn(Arc::new(FailingStore), "k".into());
        worker.submit(MemoryMutation::SetName("Alex".into()));
        worker.submit(MemoryMutation::AppendRule("r".into()));
        worker.finish().await;

        let failures: Vec<_> = logs
            .events()
            .into_iter()
            .filter(|e| e.level == Level::WARN && e.message.contains("memory write failed"))
            .collect();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].field("kind"), Some("set_name"));
        assert_eq!(failures[1].field("kind"), Some("append_rule"));
    }
}
