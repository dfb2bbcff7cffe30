//! Client frames waiting for upstream readiness.

use std::collections::VecDeque;

use bridge_core::Frame;
use tracing::warn;

/// FIFO of content frames. Unbounded; growth is logged, never shed.
///
/// The configuration frame never enters this queue.
#[derive(Debug)]
pub struct OutboundQueue {
    frames: VecDeque<Frame>,
    warn_threshold: usize,
}

impl OutboundQueue {
    /// Empty queue warning every `warn_threshold` frames (0 disables).
    pub fn new(warn_threshold: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            warn_threshold,
        }
    }

    /// Append at the back.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
        let len = self.frames.len();
        if self.warn_threshold > 0 && len % self.warn_threshold == 0 {
            warn!(queued = len, "outbound queue growing while upstream is not ready");
        }
    }

    /// Put a frame back at the head, after a failed send.
    pub fn push_front(&mut self, frame: Frame) {
        self.frames.push_front(frame);
    }

    /// Take the oldest frame.
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
