//! `WebSocketDialer` against a local tokio-tungstenite server.

use std::time::Duration;

use bridge_core::{ApiKey, Frame};
use bridge_upstream::{UpstreamDialer, UpstreamError, UpstreamEvent, WebSocketDialer};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Handshake {
    uri: String,
    user_agent: Option<String>,
}

/// Accept one connection, report its handshake, echo two frames back, send a
/// non-UTF-8 binary frame, then close with 4000.
async fn spawn_upstream() -> (String, oneshot::Receiver<Handshake>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = oneshot::channel();

    drop(tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |req: &Request, resp: Response| {
            let _ = seen_tx.send(Handshake {
                uri: req.uri().to_string(),
                user_agent: req
                    .headers()
                    .get("user-agent")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned),
            });
            Ok::<_, ErrorResponse>(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        for _ in 0..2 {
            let Some(Ok(msg)) = ws.next().await else { return };
            ws.send(msg).await.unwrap();
        }
        ws.send(Message::Binary(vec![0xff, 0xfe].into())).await.unwrap();
        ws.close(Some(tokio_tungstenite::tungstenite::protocol::CloseFrame {
            code: 4000.into(),
            reason: String::from("bye").into(),
        }))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    }));

    (format!("ws://{addr}/live"), seen_rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<UpstreamEvent>) -> UpstreamEvent {
    timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn relays_frames_and_reports_close_once() {
    let (url, seen) = spawn_upstream().await;
    let dialer = WebSocketDialer::new(url, ApiKey::new("test-key")).with_user_agent("bridge-test/1");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = dialer.dial(5, tx).await.unwrap();
    assert_eq!(handle.epoch(), 5);

    let handshake = timeout(TIMEOUT, seen).await.unwrap().unwrap();
    assert_eq!(handshake.uri, "/live?key=test-key");
    assert_eq!(handshake.user_agent.as_deref(), Some("bridge-test/1"));

    handle.send(Frame::Text(r#"{"setup":{}}"#.into())).unwrap();
    handle.send(Frame::Binary(br#"{"a":1}"#.to_vec())).unwrap();

    assert_eq!(
        next_event(&mut rx).await,
        UpstreamEvent::Frame {
            epoch: 5,
            frame: Frame::Text(r#"{"setup":{}}"#.into())
        }
    );
    // UTF-8 binary comes back as text.
    assert_eq!(
        next_event(&mut rx).await,
        UpstreamEvent::Frame {
            epoch: 5,
            frame: Frame::Text(r#"{"a":1}"#.into())
        }
    );
    assert_eq!(
        next_event(&mut rx).await,
        UpstreamEvent::Frame {
            epoch: 5,
            frame: Frame::Binary(vec![0xff, 0xfe])
        }
    );
    assert_eq!(
        next_event(&mut rx).await,
        UpstreamEvent::Closed {
            epoch: 5,
            code: Some(4000),
            reason: "bye".into()
        }
    );
    // The reader is gone; nothing else arrives.
    assert!(timeout(TIMEOUT, rx.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(tokio::spawn(async move {
        // Accept and never answer the upgrade.
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
    }));

    let dialer = WebSocketDialer::new(format!("ws://{addr}/live"), ApiKey::new("k"))
        .with_handshake_timeout(Duration::from_millis(200));
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = dialer.dial(1, tx).await;
    assert!(matches!(result, Err(UpstreamError::Timeout(_))), "{result:?}");
}

#[tokio::test]
async fn refused_connection_is_handshake_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dialer = WebSocketDialer::new(format!("ws://{addr}/live"), ApiKey::new("k"));
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = dialer.dial(1, tx).await;
    assert!(matches!(result, Err(UpstreamError::Handshake(_))), "{result:?}");
}
