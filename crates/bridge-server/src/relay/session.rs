//! Session state and its event loop.

use std::sync::Arc;

use bridge_core::constants::{
    CLOSE_GOING_AWAY, CLOSE_KEEPALIVE_TIMEOUT_REASON, CLOSE_SHUTDOWN_REASON,
    CLOSE_UPSTREAM_UNAVAILABLE, CLOSE_UPSTREAM_UNAVAILABLE_REASON,
};
use bridge_core::protocol::splice_instruction;
use bridge_core::{ClientFrameKind, Frame, UpstreamMessage};
use bridge_memory::recover;
use bridge_transcript::{MemoryMutation, TranscriptExtractor};
use bridge_upstream::{Connector, UpstreamEvent, UpstreamHandle};
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::keepalive::{KeepAlive, KeepAliveTick};
use super::persist::PersistenceWorker;
use super::queue::OutboundQueue;
use super::{ClientChannel, ClientCommand, ClientEvent, RelayDeps, SessionEnd};
use crate::metrics::{FRAMES_RELAYED_TOTAL, UPSTREAM_RECONNECTS_TOTAL, UPSTREAM_SIGNALS_TOTAL};

/// Completions of work the session spawned.
enum Internal {
    Dialed(bridge_upstream::Result<UpstreamHandle>),
    Reconnected(Option<UpstreamHandle>),
    ConfigReady {
        seq: u64,
        frame: Frame,
        known_name: Option<String>,
    },
}

struct Session {
    deps: RelayDeps,
    client: mpsc::UnboundedSender<ClientCommand>,
    connector: Connector,
    cancel: CancellationToken,
    upstream_tx: mpsc::UnboundedSender<UpstreamEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,

    upstream: Option<UpstreamHandle>,
    /// Epoch of the most recently adopted connection.
    last_epoch: u64,
    /// Events from a connection whose dial result has not been processed yet.
    early: Vec<UpstreamEvent>,
    ready: bool,
    config_sent: bool,
    /// Replay artifact, with any memory clause already spliced in.
    config: Option<Frame>,
    config_seq: u64,
    memory_seeded: bool,
    queue: OutboundQueue,

    keepalive: KeepAlive,
    extractor: TranscriptExtractor,
    persistence: Option<PersistenceWorker>,
}

/// Run the session until it ends, then tear it down.
pub(super) async fn drive(
    client: ClientChannel,
    deps: RelayDeps,
    cancel: CancellationToken,
) -> SessionEnd {
    let ClientChannel {
        events: mut client_events,
        commands,
    } = client;
    let (upstream_tx, mut upstream_rx) = mpsc::unbounded_channel();
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel();

    let mut session = Session::new(deps, commands, cancel.clone(), upstream_tx, internal_tx);
    session.dial();
    let mut ticker = session.keepalive.ticker();

    let end = loop {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Some(session.on_shutdown()),
            event = client_events.recv() => {
                session.on_client_event(event.unwrap_or(ClientEvent::Closed))
            }
            Some(internal) = internal_rx.recv() => session.on_internal(internal),
            Some(event) = upstream_rx.recv() => {
                session.on_upstream_event(event);
                None
            }
            _ = ticker.tick() => session.on_tick(),
        };
        if let Some(end) = outcome {
            break end;
        }
    };

    session.teardown().await;
    end
}

impl Session {
    fn new(
        deps: RelayDeps,
        client: mpsc::UnboundedSender<ClientCommand>,
        cancel: CancellationToken,
        upstream_tx: mpsc::UnboundedSender<UpstreamEvent>,
        internal_tx: mpsc::UnboundedSender<Internal>,
    ) -> Self {
        let config = Arc::clone(&deps.config);
        let persistence = deps
            .store
            .clone()
            .map(|store| PersistenceWorker::spawn(store, config.memory_key.clone()));

        Self {
            connector: Connector::new(Arc::clone(&deps.dialer), config.reconnect_delay),
            deps,
            client,
            cancel,
            upstream_tx,
            internal_tx,
            upstream: None,
            last_epoch: 0,
            early: Vec::new(),
            ready: false,
            config_sent: false,
            config: None,
            config_seq: 0,
            memory_seeded: false,
            queue: OutboundQueue::new(config.queue_warn_threshold),
            keepalive: KeepAlive::new(config.heartbeat_interval, config.heartbeat_timeout),
            extractor: TranscriptExtractor::new(config.transcript.clone()),
            persistence,
        }
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    /// Initial connection. Its failure ends the session.
    fn dial(&self) {
        let connector = self.connector.clone();
        let events = self.upstream_tx.clone();
        let done = self.internal_tx.clone();
        drop(tokio::spawn(async move {
            let result = connector.connect(events).await;
            let _ = done.send(Internal::Dialed(result));
        }));
    }

    fn schedule_reconnect(&self) {
        let connector = self.connector.clone();
        let events = self.upstream_tx.clone();
        let done = self.internal_tx.clone();
        let cancel = self.cancel.clone();
        drop(tokio::spawn(async move {
            let handle = connector.reconnect(events, &cancel).await;
            let _ = done.send(Internal::Reconnected(handle));
        }));
    }

    fn on_internal(&mut self, internal: Internal) -> Option<SessionEnd> {
        match internal {
            Internal::Dialed(Ok(handle)) => {
                info!(epoch = handle.epoch(), "upstream connected");
                self.adopt(handle);
            }
            Internal::Dialed(Err(error)) => {
                warn!(%error, "upstream connection failed");
                self.close_client(CLOSE_UPSTREAM_UNAVAILABLE, CLOSE_UPSTREAM_UNAVAILABLE_REASON);
                return Some(SessionEnd::UpstreamUnavailable);
            }
            Internal::Reconnected(Some(handle)) => self.adopt(handle),
            Internal::Reconnected(None) => {}
            Internal::ConfigReady {
                seq,
                frame,
                known_name,
            } => self.on_config_ready(seq, frame, known_name),
        }
        None
    }

    /// Make `handle` the current connection and send it the cached
    /// configuration, which always goes first.
    fn adopt(&mut self, handle: UpstreamHandle) {
        let epoch = handle.epoch();
        self.last_epoch = epoch;
        self.upstream = Some(handle);
        self.ready = false;
        self.config_sent = false;
        self.send_config();

        let (mine, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.early)
            .into_iter()
            .filter(|event| event.epoch() >= epoch)
            .partition(|event| event.epoch() == epoch);
        self.early = later;
        for event in mine {
            self.on_upstream_event(event);
        }
    }

    fn on_shutdown(&self) -> SessionEnd {
        info!("server shutting down, closing client");
        self.close_client(CLOSE_GOING_AWAY, CLOSE_SHUTDOWN_REASON);
        SessionEnd::Shutdown
    }

    fn on_tick(&self) -> Option<SessionEnd> {
        match self.keepalive.on_tick() {
            KeepAliveTick::Ping => {
                let _ = self.client.send(ClientCommand::Ping);
                None
            }
            KeepAliveTick::TimedOut => {
                warn!("client stopped answering keep-alive pings");
                self.close_client(CLOSE_GOING_AWAY, CLOSE_KEEPALIVE_TIMEOUT_REASON);
                Some(SessionEnd::KeepAliveTimeout)
            }
        }
    }

    /// Stop reconnecting, persist what the session learned, close upstream.
    async fn teardown(mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.persistence.take() {
            if let Some(mutation) = self.extractor.final_mutation() {
                worker.submit(mutation);
            }
            worker.finish().await;
        }
        if let Some(handle) = self.upstream.take() {
            handle.close();
        }
        if !self.queue.is_empty() {
            debug!(dropped = self.queue.len(), "queued frames discarded at teardown");
        }
    }

    fn close_client(&self, code: u16, reason: &str) {
        let _ = self.client.send(ClientCommand::Close {
            code,
            reason: reason.to_owned(),
        });
    }

    // ── client → upstream ───────────────────────────────────────────────────

    fn on_client_event(&mut self, event: ClientEvent) -> Option<SessionEnd> {
        match event {
            ClientEvent::Closed => return Some(SessionEnd::ClientClosed),
            ClientEvent::Pong => self.keepalive.mark_alive(),
            ClientEvent::Frame(frame) => {
                self.keepalive.mark_alive();
                match ClientFrameKind::of(&frame) {
                    ClientFrameKind::Configuration => self.on_config_frame(frame),
                    ClientFrameKind::Content { user_text } => {
                        if let Some(text) = user_text {
                            self.extractor.record_user_text(&text);
                        }
                        self.forward_or_queue(frame);
                    }
                }
            }
        }
        None
    }

    /// Recover memory off the loop, then come back with the spliced frame.
    fn on_config_frame(&mut self, frame: Frame) {
        self.config_seq += 1;
        let seq = self.config_seq;
        debug!(seq, bytes = frame.len(), "configuration frame received");

        let Some(store) = self.deps.store.clone() else {
            self.on_config_ready(seq, frame, None);
            return;
        };
        let key = self.deps.config.memory_key.clone();
        let done = self.internal_tx.clone();
        drop(tokio::spawn(async move {
            let recovered = recover(Some(store.as_ref()), &key).await;
            let known_name = recovered.user_name().map(str::to_owned);
            let frame = with_memory(frame, recovered.clause.as_deref());
            let _ = done.send(Internal::ConfigReady {
                seq,
                frame,
                known_name,
            });
        }));
    }

    fn on_config_ready(&mut self, seq: u64, frame: Frame, known_name: Option<String>) {
        if seq != self.config_seq {
            debug!(seq, latest = self.config_seq, "superseded configuration dropped");
            return;
        }
        if !self.memory_seeded {
            self.extractor.set_known_name(known_name);
            self.memory_seeded = true;
        }
        self.config = Some(frame);
        self.send_config();
    }

    fn send_config(&mut self) {
        let (Some(handle), Some(config)) = (&self.upstream, &self.config) else {
            return;
        };
        match handle.send(config.clone()) {
            Ok(()) => {
                self.config_sent = true;
                debug!(epoch = handle.epoch(), bytes = config.len(), "configuration sent");
            }
            Err(error) => debug!(epoch = handle.epoch(), %error, "configuration not sent"),
        }
    }

    fn forward_or_queue(&mut self, frame: Frame) {
        let handle = match &self.upstream {
            Some(handle) if self.ready && !handle.is_closed() => handle,
            _ => {
                self.queue.push(frame);
                return;
            }
        };
        match handle.send(frame.clone()) {
            Ok(()) => {
                counter!(FRAMES_RELAYED_TOTAL, "direction" => "client_to_upstream").increment(1);
            }
            Err(error) => {
                debug!(epoch = handle.epoch(), %error, "upstream writer stopped, frame queued");
                self.queue.push(frame);
            }
        }
    }

    /// Readiness acknowledged on the current connection: flush FIFO.
    fn on_ready(&mut self) {
        self.ready = true;
        let Some(handle) = self.upstream.as_ref() else {
            return;
        };
        let mut flushed: u64 = 0;
        while let Some(frame) = self.queue.pop() {
            if let Err(error) = handle.send(frame.clone()) {
                warn!(epoch = handle.epoch(), %error, queued = self.queue.len() + 1, "flush interrupted");
                self.queue.push_front(frame);
                break;
            }
            flushed += 1;
        }
        counter!(FRAMES_RELAYED_TOTAL, "direction" => "client_to_upstream").increment(flushed);
        info!(epoch = handle.epoch(), flushed, "upstream ready");
    }

    // ── upstream → client ───────────────────────────────────────────────────

    fn on_upstream_event(&mut self, event: UpstreamEvent) {
        let epoch = event.epoch();
        if self.upstream.as_ref().map(UpstreamHandle::epoch) != Some(epoch) {
            if epoch > self.last_epoch {
                self.early.push(event);
            } else {
                debug!(epoch, current = self.last_epoch, "event from superseded upstream ignored");
            }
            return;
        }

        match event {
            UpstreamEvent::Frame { frame, .. } => self.on_upstream_frame(frame),
            UpstreamEvent::Closed { code, reason, .. } => {
                warn!(epoch, code = ?code, %reason, queued = self.queue.len(), "upstream closed, reconnecting");
                self.upstream = None;
                self.ready = false;
                self.config_sent = false;
                counter!(UPSTREAM_RECONNECTS_TOTAL).increment(1);
                self.schedule_reconnect();
            }
        }
    }

    fn on_upstream_frame(&mut self, frame: Frame) {
        let message = frame.as_text().and_then(UpstreamMessage::parse);
        if let Some(message) = &message {
            if let Some(text) = message.text.as_deref() {
                let now = tokio::time::Instant::now().into_std();
                for mutation in self.extractor.observe_assistant_text(text, now) {
                    self.persist(mutation);
                }
            }
            if message.interrupted {
                debug!("upstream turn interrupted");
                counter!(UPSTREAM_SIGNALS_TOTAL, "signal" => "interrupted").increment(1);
            }
            if message.turn_complete {
                debug!("upstream turn complete");
                counter!(UPSTREAM_SIGNALS_TOTAL, "signal" => "turn_complete").increment(1);
            }
        }

        let _ = self.client.send(ClientCommand::Frame(frame));
        counter!(FRAMES_RELAYED_TOTAL, "direction" => "upstream_to_client").increment(1);

        if message.is_some_and(|m| m.setup_complete) && !self.ready {
            if self.config_sent {
                self.on_ready();
            } else {
                debug!("readiness acknowledged before configuration, ignored");
            }
        }
    }

    fn persist(&self, mutation: MemoryMutation) {
        match &self.persistence {
            Some(worker) => worker.submit(mutation),
            None => debug!(kind = mutation.kind(), "memory disabled, update skipped"),
        }
    }
}

/// Append the recall clause to the setup frame's instruction, or return the
/// frame untouched when there is nothing to add or nowhere to add it.
fn with_memory(frame: Frame, clause: Option<&str>) -> Frame {
    let Some(clause) = clause else {
        return frame;
    };
    let Some(text) = frame.as_text() else {
        return frame;
    };
    match splice_instruction(text, clause) {
        Ok(spliced) => {
            info!("recovered memory added to configuration");
            Frame::Text(spliced)
        }
        Err(error) => {
            debug!(%error, "configuration forwarded without memory");
            frame
        }
    }
}
