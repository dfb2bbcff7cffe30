//! Client liveness tracking.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Outcome of one keep-alive tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepAliveTick {
    /// Send a ping and keep going.
    Ping,
    /// Nothing was heard within the timeout; tear the session down.
    TimedOut,
}

/// Tracks the last time the client was heard from.
///
/// Any inbound frame counts, not only pongs.
#[derive(Debug)]
pub struct KeepAlive {
    interval: Duration,
    timeout: Duration,
    last_seen: Instant,
}

impl KeepAlive {
    /// Start tracking now.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            last_seen: Instant::now(),
        }
    }

    /// Ticker whose first tick is one interval from now.
    pub fn ticker(&self) -> Interval {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// The client sent something.
    pub fn mark_alive(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Decide what to do on a tick.
    pub fn on_tick(&self) -> KeepAliveTick {
        if self.last_seen.elapsed() >= self.timeout {
            KeepAliveTick::TimedOut
        } else {
            KeepAliveTick::Ping
        }
    }
}
