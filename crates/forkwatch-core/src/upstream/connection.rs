//! Per-node connection lifecycle.
//!
//! Each configured node gets one `ConnectionManager` task owning the node's
//! WebSocket transport and its registry entry. The task runs a retry-forever
//! state machine:
//!
//! ```text
//! Disconnected → Connecting → AwaitingSubscriptionAck → Connected
//!       ▲                                                  │
//!       └────────────── fixed backoff ◄────────────────────┘
//! ```
//!
//! Every failure — handshake, missing subscribe ack, transport close, health
//! timeout — feeds the same path: reset the registry entry, sleep the fixed
//! backoff, reconnect. Only the shutdown signal, observed at every wait,
//! leaves the loop for good.

use crate::{
    detector,
    registry::{NodeRegistry, NodeWriter},
    types::{subscribe_request, subscription_ack, MomentumHeader},
    upstream::{errors::NodeError, health::HealthMonitor, Timing},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::{
    net::TcpStream,
    sync::broadcast,
    time::{interval_at, timeout, Instant, MissedTickBehavior},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// The client-side WebSocket transport to a node.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How an ingestion loop ended.
enum LoopExit {
    /// The process-wide shutdown signal was observed.
    Shutdown,
    /// The connection failed; the state machine re-enters the backoff path.
    Disconnect(NodeError),
}

/// Owns the connection lifecycle for a single node.
pub struct ConnectionManager {
    name: Arc<str>,
    ws_url: String,
    timing: Timing,
    writer: NodeWriter,
    registry: Arc<NodeRegistry>,
    health: HealthMonitor,
}

impl ConnectionManager {
    /// Creates a manager bound to the node the writer was claimed for.
    #[must_use]
    pub fn new(
        writer: NodeWriter,
        ws_url: String,
        timing: Timing,
        registry: Arc<NodeRegistry>,
    ) -> Self {
        let name = writer.name().clone();
        let health = HealthMonitor::new(timing.message_timeout);
        Self { name, ws_url, timing, writer, registry, health }
    }

    /// Runs the connection state machine until shutdown.
    ///
    /// The shutdown receiver is threaded in explicitly; it is checked at the
    /// top of every wait so the task never blocks longer than one poll
    /// timeout before noticing cancellation.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(node = %self.name, url = %self.ws_url, "node monitor task started");

        loop {
            let attempt = tokio::select! {
                _ = shutdown.recv() => break,
                attempt = self.connect_and_subscribe() => attempt,
            };

            match attempt {
                Ok(stream) => match self.ingest(stream, &mut shutdown).await {
                    LoopExit::Shutdown => break,
                    LoopExit::Disconnect(err) => {
                        warn!(
                            node = %self.name,
                            error = %err,
                            kind = err.kind(),
                            "node connection lost, will reconnect"
                        );
                        self.writer.mark_disconnected();
                    }
                },
                Err(err) => {
                    warn!(
                        node = %self.name,
                        error = %err,
                        kind = err.kind(),
                        "connection attempt failed"
                    );
                    self.writer.mark_disconnected();
                }
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(self.timing.retry_backoff) => {}
            }
        }

        self.writer.mark_disconnected();
        info!(node = %self.name, "node monitor task stopped");
    }

    /// Performs the WebSocket handshake, sends the subscribe request, and
    /// waits for the acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails, the acknowledgment does not
    /// arrive within the configured window, or the node answers without a
    /// `result` field. All of these are treated identically by the caller.
    async fn connect_and_subscribe(&self) -> Result<WsStream, NodeError> {
        debug!(node = %self.name, url = %self.ws_url, "connecting");
        let (mut stream, _response) = connect_async(self.ws_url.as_str()).await?;

        let request = serde_json::to_string(&subscribe_request())
            .map_err(|e| NodeError::Malformed(e.to_string()))?;
        stream.send(Message::Text(request.into())).await?;

        let ack =
            timeout(self.timing.subscribe_ack_timeout, Self::read_subscription_ack(&mut stream))
                .await;
        let subscription_id = match ack {
            Ok(Ok(id)) => id,
            Ok(Err(err)) => {
                let _ = stream.close(None).await;
                return Err(err);
            }
            Err(_elapsed) => {
                let _ = stream.close(None).await;
                return Err(NodeError::SubscribeTimeout);
            }
        };

        self.writer.mark_connected(subscription_id.clone());
        info!(
            node = %self.name,
            subscription = %subscription_id,
            "subscribed to momentum feed"
        );
        Ok(stream)
    }

    /// Reads frames until the subscribe acknowledgment arrives.
    async fn read_subscription_ack(stream: &mut WsStream) -> Result<String, NodeError> {
        while let Some(frame) = stream.next().await {
            match frame? {
                Message::Text(text) => {
                    let value: Value = serde_json::from_str(&text)
                        .map_err(|e| NodeError::Malformed(e.to_string()))?;
                    return subscription_ack(&value)
                        .ok_or_else(|| NodeError::SubscribeRejected(text.to_string()));
                }
                Message::Ping(payload) => stream.send(Message::Pong(payload)).await?,
                Message::Close(_) => return Err(NodeError::Closed("closed during subscribe")),
                _ => {}
            }
        }
        Err(NodeError::Closed("stream ended during subscribe"))
    }

    /// The ingestion loop run while connected.
    ///
    /// Polls with a short timeout purely so the loop can observe the
    /// shutdown signal and the health precondition promptly; a poll timeout
    /// by itself is not an error. Keep-alive Ping probes go out on a fixed
    /// interval, and an unanswered probe past the probe timeout fails the
    /// connection.
    async fn ingest(&self, stream: WsStream, shutdown: &mut broadcast::Receiver<()>) -> LoopExit {
        let (mut sink, mut source) = stream.split();

        let mut keepalive = interval_at(
            Instant::now() + self.timing.keepalive_interval,
            self.timing.keepalive_interval,
        );
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending_probe: Option<std::time::Instant> = None;

        loop {
            if let Err(err) = self.health.check(&self.writer) {
                let _ = sink.close().await;
                return LoopExit::Disconnect(err);
            }
            if let Some(sent) = pending_probe {
                if sent.elapsed() > self.timing.keepalive_timeout {
                    let _ = sink.close().await;
                    return LoopExit::Disconnect(NodeError::Closed("keep-alive probe unanswered"));
                }
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = sink.close().await;
                    return LoopExit::Shutdown;
                }

                _ = keepalive.tick() => {
                    if pending_probe.is_none() {
                        if let Err(err) = sink.send(Message::Ping(Vec::new().into())).await {
                            return LoopExit::Disconnect(err.into());
                        }
                        pending_probe = Some(std::time::Instant::now());
                    }
                }

                polled = timeout(self.timing.poll_timeout, source.next()) => {
                    let frame = match polled {
                        // Poll timeout: not an error, loop back to re-check
                        // shutdown and the health precondition.
                        Err(_elapsed) => continue,
                        Ok(None) => {
                            return LoopExit::Disconnect(NodeError::Closed(
                                "connection closed by peer",
                            ));
                        }
                        Ok(Some(Err(err))) => return LoopExit::Disconnect(err.into()),
                        Ok(Some(Ok(frame))) => frame,
                    };

                    // Any traffic counts as liveness, not only momentums.
                    self.writer.touch();

                    match frame {
                        Message::Text(text) => self.process_text(&text),
                        Message::Pong(_) => pending_probe = None,
                        Message::Ping(payload) => {
                            if let Err(err) = sink.send(Message::Pong(payload)).await {
                                return LoopExit::Disconnect(err.into());
                            }
                        }
                        Message::Close(_) => {
                            return LoopExit::Disconnect(NodeError::Closed(
                                "close frame received",
                            ));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Handles one Text frame: accept a momentum and run the fork check, or
    /// log and discard. A malformed frame never affects connection state.
    fn process_text(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                warn!(node = %self.name, error = %err, "discarding unparseable message");
                return;
            }
        };

        match MomentumHeader::from_notification(&value) {
            Some(momentum) => {
                debug!(
                    node = %self.name,
                    height = momentum.height,
                    hash = %momentum.hash,
                    "momentum accepted"
                );
                self.writer.accept_momentum(momentum.height, &momentum.hash);
                detector::scan(&self.registry);
            }
            None => {
                warn!(node = %self.name, message = %text, "unexpected message shape, discarding");
            }
        }
    }
}
