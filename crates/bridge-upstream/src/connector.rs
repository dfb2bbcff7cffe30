//! Connection lifecycle for one session: epochs, initial dial, reconnect loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dialer::UpstreamDialer;
use crate::errors::Result;
use crate::link::{UpstreamEvent, UpstreamHandle};

/// Dials upstream on behalf of one session.
///
/// Cheap to clone; clones share the epoch counter, so every connection the
/// session ever opens gets a distinct, increasing epoch.
#[derive(Clone)]
pub struct Connector {
    dialer: Arc<dyn UpstreamDialer>,
    reconnect_delay: Duration,
    epochs: Arc<AtomicU64>,
}

impl Connector {
    /// Create a connector.
    pub fn new(dialer: Arc<dyn UpstreamDialer>, reconnect_delay: Duration) -> Self {
        Self {
            dialer,
            reconnect_delay,
            epochs: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_epoch(&self) -> u64 {
        self.epochs.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// One attempt. Failure is returned to the caller and not retried.
    pub async fn connect(
        &self,
        events: mpsc::UnboundedSender<UpstreamEvent>,
    ) -> Result<UpstreamHandle> {
        let epoch = self.next_epoch();
        self.dialer.dial(epoch, events).await
    }

    /// Wait the fixed delay and dial, until a dial succeeds or `cancel` fires.
    ///
    /// Cancellation is honored between attempts; a dial already in flight is
    /// allowed to finish, and its connection is closed straight away.
    pub async fn reconnect(
        &self,
        events: mpsc::UnboundedSender<UpstreamEvent>,
        cancel: &CancellationToken,
    ) -> Option<UpstreamHandle> {
        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
            attempt += 1;
            let epoch = self.next_epoch();

            match self.dialer.dial(epoch, events.clone()).await {
                Ok(handle) if cancel.is_cancelled() => {
                    handle.close();
                    return None;
                }
                Ok(handle) => {
                    info!(epoch, attempt, "upstream reconnected");
                    return Some(handle);
                }
                Err(error) => warn!(epoch, attempt, %error, "upstream reconnect attempt failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::errors::UpstreamError;

    /// Succeeds or fails per a script; records the epochs it was asked for.
    struct ScriptedDialer {
        outcomes: Mutex<VecDeque<bool>>,
        epochs: Mutex<Vec<u64>>,
    }

    impl ScriptedDialer {
        fn new(outcomes: impl IntoIterator<Item = bool>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                epochs: Mutex::new(Vec::new()),
            })
        }

        fn epochs(&self) -> Vec<u64> {
            self.epochs.lock().clone()
        }
    }

    #[async_trait]
    impl UpstreamDialer for ScriptedDialer {
        async fn dial(
            &self,
            epoch: u64,
            _events: mpsc::UnboundedSender<UpstreamEvent>,
        ) -> Result<UpstreamHandle> {
            self.epochs.lock().push(epoch);
            if self.outcomes.lock().pop_front().unwrap_or(false) {
                let (handle, rx) = UpstreamHandle::channel(epoch);
                // Keep the writer side alive for the test's duration.
                std::mem::forget(rx);
                Ok(handle)
            } else {
                Err(UpstreamError::Handshake("refused".into()))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn initial_failure_is_not_retried() {
        let dialer = ScriptedDialer::new([false, true]);
        let connector = Connector::new(dialer.clone(), Duration::from_secs(1));
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(connector.connect(tx).await.is_err());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(dialer.epochs(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_retries_at_fixed_delay() {
        let dialer = ScriptedDialer::new([true, false, false, true]);
        let connector = Connector::new(dialer.clone(), Duration::from_secs(1));
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = connector.connect(tx.clone()).await.unwrap();
        assert_eq!(first.epoch(), 1);

        let start = tokio::time::Instant::now();
        let cancel = CancellationToken::new();
        let handle = connector.reconnect(tx, &cancel).await.unwrap();

        assert_eq!(handle.epoch(), 4);
        assert_eq!(dialer.epochs(), vec![1, 2, 3, 4]);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_pending_reconnect() {
        let dialer = ScriptedDialer::new([]);
        let connector = Connector::new(dialer.clone(), Duration::from_secs(1));
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = {
            let connector = connector.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { connector.reconnect(tx, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();

        assert!(task.await.unwrap().is_none());
        assert_eq!(dialer.epochs(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_first_attempt_never_dials() {
        let dialer = ScriptedDialer::new([true]);
        let connector = Connector::new(dialer.clone(), Duration::from_secs(1));
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(connector.reconnect(tx, &cancel).await.is_none());
        assert!(dialer.epochs().is_empty());
    }
}
