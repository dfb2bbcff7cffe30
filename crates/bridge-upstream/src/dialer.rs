//! Opening upstream connections.

use std::time::Duration;

use async_trait::async_trait;
use bridge_core::{ApiKey, Frame};
use bridge_settings::UpstreamSettings;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, instrument};

use crate::errors::{Result, UpstreamError};
use crate::link::{UpstreamCommand, UpstreamEvent, UpstreamHandle};

/// Opens one upstream connection.
///
/// On success the implementation must deliver every inbound frame to
/// `events`, followed by exactly one [`UpstreamEvent::Closed`], all tagged
/// with `epoch`. On failure nothing is sent.
#[async_trait]
pub trait UpstreamDialer: Send + Sync {
    /// Open a connection.
    async fn dial(
        &self,
        epoch: u64,
        events: mpsc::UnboundedSender<UpstreamEvent>,
    ) -> Result<UpstreamHandle>;
}

/// Production dialer over `tokio-tungstenite`.
#[derive(Clone)]
pub struct WebSocketDialer {
    url: String,
    api_key: ApiKey,
    user_agent: String,
    handshake_timeout: Duration,
}

impl WebSocketDialer {
    /// Dialer for `url`, authenticating with `api_key`.
    pub fn new(url: impl Into<String>, api_key: ApiKey) -> Self {
        let defaults = UpstreamSettings::default();
        Self {
            url: url.into(),
            api_key,
            handshake_timeout: defaults.handshake_timeout(),
            user_agent: defaults.user_agent,
        }
    }

    /// Dialer configured from settings. Fails without a credential.
    pub fn from_settings(settings: &UpstreamSettings) -> Result<Self> {
        let api_key = settings.api_key().ok_or(UpstreamError::MissingCredential)?;
        Ok(Self::new(settings.url.clone(), api_key)
            .with_user_agent(settings.user_agent.clone())
            .with_handshake_timeout(settings.handshake_timeout()))
    }

    /// Override the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Override the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Endpoint with the credential attached. Never log this.
    fn endpoint(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}key={}", self.url, self.api_key.expose())
    }
}

impl std::fmt::Debug for WebSocketDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketDialer")
            .field("url", &self.url)
            .field("user_agent", &self.user_agent)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl UpstreamDialer for WebSocketDialer {
    #[instrument(skip_all, fields(epoch = epoch, url = %self.url))]
    async fn dial(
        &self,
        epoch: u64,
        events: mpsc::UnboundedSender<UpstreamEvent>,
    ) -> Result<UpstreamHandle> {
        let mut request = self
            .endpoint()
            .into_client_request()
            .map_err(|e| UpstreamError::InvalidEndpoint(e.to_string()))?;
        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|e| UpstreamError::InvalidEndpoint(format!("user agent: {e}")))?;
        let _ = request.headers_mut().insert(USER_AGENT, user_agent);

        let (socket, _response) = tokio::time::timeout(self.handshake_timeout, connect_async(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.handshake_timeout))?
            .map_err(|e| UpstreamError::Handshake(e.to_string()))?;
        info!("upstream connected");

        let (sink, stream) = socket.split();
        let (handle, commands) = UpstreamHandle::channel(epoch);
        drop(tokio::spawn(write_loop(epoch, sink, commands)));
        drop(tokio::spawn(read_loop(epoch, stream, events)));
        Ok(handle)
    }
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}

/// Binary payloads that are valid UTF-8 are relayed as text.
fn binary_frame(bytes: Vec<u8>) -> Frame {
    match String::from_utf8(bytes) {
        Ok(text) => Frame::Text(text),
        Err(e) => Frame::Binary(e.into_bytes()),
    }
}

async fn write_loop<S>(epoch: u64, mut sink: S, mut commands: mpsc::UnboundedReceiver<UpstreamCommand>)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(command) = commands.recv().await {
        match command {
            UpstreamCommand::Send(frame) => {
                if let Err(error) = sink.send(into_message(frame)).await {
                    debug!(epoch, %error, "upstream write failed");
                    return;
                }
            }
            UpstreamCommand::Close => break,
        }
    }
    let close = Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: String::new().into(),
    }));
    let _ = sink.send(close).await;
    let _ = sink.close().await;
    debug!(epoch, "upstream writer stopped");
}

async fn read_loop<S>(epoch: u64, mut stream: S, events: mpsc::UnboundedSender<UpstreamEvent>)
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    let mut code = None;
    let mut reason = String::new();

    while let Some(next) = stream.next().await {
        let frame = match next {
            Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
            Ok(Message::Binary(bytes)) => binary_frame(bytes.to_vec()),
            Ok(Message::Close(close)) => {
                if let Some(close) = close {
                    code = Some(u16::from(close.code));
                    reason = close.reason.as_str().to_owned();
                }
                break;
            }
            // Ping replies are queued by the library.
            Ok(_) => continue,
            Err(error) => {
                reason = error.to_string();
                break;
            }
        };
        if events.send(UpstreamEvent::Frame { epoch, frame }).is_err() {
            return;
        }
    }

    debug!(epoch, ?code, %reason, "upstream reader stopped");
    let _ = events.send(UpstreamEvent::Closed {
        epoch,
        code,
        reason,
    });
}
