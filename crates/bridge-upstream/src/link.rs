//! Handle and events of one open upstream connection.

use bridge_core::Frame;
use tokio::sync::mpsc;

use crate::errors::{Result, UpstreamError};

/// Something that happened on an upstream connection.
///
/// Every event carries the epoch of the connection it came from, so the relay
/// can drop events from a connection it has already replaced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A data frame from the service.
    Frame {
        /// Connection epoch.
        epoch: u64,
        /// Payload, unchanged apart from UTF-8 binary becoming text.
        frame: Frame,
    },
    /// The connection ended. Sent exactly once per connection, last.
    Closed {
        /// Connection epoch.
        epoch: u64,
        /// Close code from the peer, if it sent one.
        code: Option<u16>,
        /// Close reason or transport error text.
        reason: String,
    },
}

impl UpstreamEvent {
    /// Epoch of the originating connection.
    pub fn epoch(&self) -> u64 {
        match self {
            Self::Frame { epoch, .. } | Self::Closed { epoch, .. } => *epoch,
        }
    }
}

/// Instruction for a connection's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamCommand {
    /// Write one frame.
    Send(Frame),
    /// Send a normal close and stop writing.
    Close,
}

/// Write side of an open upstream connection.
///
/// Dropping the handle closes the connection.
#[derive(Debug)]
pub struct UpstreamHandle {
    epoch: u64,
    tx: mpsc::UnboundedSender<UpstreamCommand>,
}

impl UpstreamHandle {
    /// A handle plus the command stream its writer consumes.
    pub fn channel(epoch: u64) -> (Self, mpsc::UnboundedReceiver<UpstreamCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { epoch, tx }, rx)
    }

    /// Connection epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queue a frame for writing.
    ///
    /// Fails only when the writer has stopped, in which case a
    /// [`UpstreamEvent::Closed`] for this epoch is on its way.
    pub fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(UpstreamCommand::Send(frame))
            .map_err(|_| UpstreamError::Closed)
    }

    /// Ask the writer to close the connection.
    pub fn close(&self) {
        let _ = self.tx.send(UpstreamCommand::Close);
    }

    /// Whether the writer has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
