//! Client WebSocket adapter: turns an axum socket into relay channels.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bridge_core::Frame;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::relay::{ClientChannel, ClientCommand, ClientEvent};

/// How long a refused client gets to acknowledge the close frame.
const REFUSE_LINGER: Duration = Duration::from_secs(1);

/// Reader and writer tasks attached to one client socket.
pub struct ClientTransport {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Split `socket` and start pumping it to and from the returned channel.
pub fn attach(socket: WebSocket) -> (ClientChannel, ClientTransport) {
    let (channel, events, commands) = ClientChannel::pair();
    let (sink, stream) = socket.split();
    let transport = ClientTransport {
        reader: tokio::spawn(read_loop(stream, events)),
        writer: tokio::spawn(write_loop(sink, commands)),
    };
    (channel, transport)
}

impl ClientTransport {
    /// Wait for the writer to flush (it stops once the relay drops its
    /// sender), then stop reading.
    pub async fn finish(self) {
        if let Err(error) = self.writer.await {
            warn!(%error, "client writer task failed");
        }
        self.reader.abort();
    }
}

async fn read_loop(mut stream: SplitStream<WebSocket>, events: mpsc::UnboundedSender<ClientEvent>) {
    while let Some(message) = stream.next().await {
        let event = match message {
            Ok(Message::Text(text)) => ClientEvent::Frame(Frame::Text(text.as_str().to_owned())),
            Ok(Message::Binary(bytes)) => ClientEvent::Frame(Frame::Binary(bytes.to_vec())),
            Ok(Message::Ping(_) | Message::Pong(_)) => ClientEvent::Pong,
            Ok(Message::Close(frame)) => {
                debug!(code = ?frame.as_ref().map(|f| f.code), "client sent close");
                break;
            }
            Err(error) => {
                debug!(%error, "client socket error");
                break;
            }
        };
        if events.send(event).is_err() {
            return;
        }
    }
    let _ = events.send(ClientEvent::Closed);
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut commands: mpsc::UnboundedReceiver<ClientCommand>,
) {
    while let Some(command) = commands.recv().await {
        let (message, last) = match command {
            ClientCommand::Frame(Frame::Text(text)) => (Message::Text(text.into()), false),
            ClientCommand::Frame(Frame::Binary(bytes)) => (Message::Binary(bytes.into()), false),
            ClientCommand::Ping => (Message::Ping(vec![].into()), false),
            ClientCommand::Close { code, reason } => (
                Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
                true,
            ),
        };
        if let Err(error) = sink.send(message).await {
            debug!(%error, "client write failed");
            return;
        }
        if last {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Close a socket straight away, without starting a session.
pub async fn refuse(mut socket: WebSocket, code: u16, reason: &str) {
    let close = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_owned().into(),
    }));
    if let Err(error) = socket.send(close).await {
        debug!(%error, "refused client already gone");
        return;
    }
    // Let the client answer the close handshake.
    let _ = tokio::time::timeout(REFUSE_LINGER, async {
        while let Some(Ok(_)) = socket.recv().await {}
    })
    .await;
}
