//! Graceful shutdown: one root token, every session tracked.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Coordinates shutdown across the listener and all sessions.
///
/// Session tokens are children of the root token, so cancelling the root
/// tears every session down (each one still runs its final persistence).
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// The root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown was signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a session future so shutdown waits for it.
    pub fn track<F: Future>(&self, future: F) -> TrackedFuture<F> {
        self.tracker.track_future(future)
    }

    /// Number of tracked futures still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel the root token and wait up to `timeout` for tracked sessions.
    pub async fn graceful_shutdown(&self, timeout: Duration) {
        self.shutdown();
        let _ = self.tracker.close();
        info!(
            sessions = self.tracker.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "waiting for sessions to finish"
        );
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(remaining = self.tracker.len(), "shutdown timed out after {timeout:?}");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn child_tokens_follow_root() {
        let coord = ShutdownCoordinator::new();
        let session = coord.token().child_token();
        coord.shutdown();
        coord.shutdown();
        assert!(session.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_tracked_sessions() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token().child_token();
        let done = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = done.clone();

        drop(tokio::spawn(coord.track(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        })));
        assert_eq!(coord.active(), 1);

        coord.graceful_shutdown(Duration::from_secs(5)).await;
        assert!(done.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(coord.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        drop(tokio::spawn(coord.track(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        })));

        let start = tokio::time::Instant::now();
        coord.graceful_shutdown(Duration::from_millis(100)).await;
        assert!(coord.is_shutting_down());
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }
}
