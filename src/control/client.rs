//! Persistent connection to the coordinator.
//!
//! # Responsibilities
//! - Keep one WebSocket session to the coordinator open
//! - Apply routing updates in the order they arrive
//! - Report per-client connection rates once per accounting window
//! - Reconnect with backoff; the gateway keeps serving the last table meanwhile
//!
//! # State Transitions
//! ```text
//! Disconnected → Connected: handshake succeeded
//! Connected → Disconnected: transport error or coordinator close
//! Connected → Closing → Disconnected: process shutdown
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::accounting::{MemoryAccountant, WindowId};
use crate::config::ControlConfig;
use crate::control::message::{apply_text, ControlError, Report};
use crate::resilience::Backoff;
use crate::routing::RoutingTable;

type CoordinatorStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state of the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Closing,
}

#[derive(Debug, Default)]
struct UpdateCounters {
    applied: AtomicU64,
    rejected: AtomicU64,
}

/// Read-only view of a running control client.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    state: watch::Receiver<ConnectionState>,
    counters: Arc<UpdateCounters>,
}

impl ControlHandle {
    /// Handle for a gateway running without a coordinator.
    pub fn detached() -> Self {
        let (_, state) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            counters: Arc::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that is notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Updates applied to the routing table.
    pub fn applied(&self) -> u64 {
        self.counters.applied.load(Ordering::Relaxed)
    }

    /// Messages discarded as malformed.
    pub fn rejected(&self) -> u64 {
        self.counters.rejected.load(Ordering::Relaxed)
    }
}

enum SessionEnd {
    Lost,
    Shutdown,
}

/// Client side of the coordinator control channel.
pub struct ControlChannelClient {
    config: ControlConfig,
    table: Arc<RoutingTable>,
    client_rates: Arc<MemoryAccountant>,
    state: watch::Sender<ConnectionState>,
    counters: Arc<UpdateCounters>,
    last_reported: Option<WindowId>,
}

impl ControlChannelClient {
    pub fn new(
        config: ControlConfig,
        table: Arc<RoutingTable>,
        client_rates: Arc<MemoryAccountant>,
    ) -> (Self, ControlHandle) {
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let counters = Arc::new(UpdateCounters::default());
        let handle = ControlHandle {
            state: state_rx,
            counters: Arc::clone(&counters),
        };

        (
            Self {
                config,
                table,
                client_rates,
                state,
                counters,
                last_reported: None,
            },
            handle,
        )
    }

    /// Connect, serve the session, reconnect; until shutdown.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = Backoff::new(
            Duration::from_millis(self.config.reconnect_base_ms),
            Duration::from_millis(self.config.reconnect_max_ms),
        );
        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);

        tracing::info!(url = %self.config.coordinator_url, "Control channel starting");

        loop {
            let connect = tokio::time::timeout(connect_timeout, connect_async(self.config.coordinator_url.as_str()));
            let outcome = tokio::select! {
                outcome = connect => outcome,
                _ = shutdown.recv() => break,
            };

            match outcome {
                Ok(Ok((stream, _response))) => {
                    backoff.reset();
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(url = %self.config.coordinator_url, "Connected to coordinator");

                    let end = self.session(stream, &mut shutdown).await;
                    self.set_state(ConnectionState::Disconnected);
                    if let SessionEnd::Shutdown = end {
                        break;
                    }
                    tracing::warn!(
                        routing_version = self.table.version(),
                        "Disconnected from coordinator, serving last known routing table"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!(url = %self.config.coordinator_url, error = %e, "Coordinator connection failed");
                }
                Err(_) => {
                    tracing::warn!(
                        url = %self.config.coordinator_url,
                        timeout = ?connect_timeout,
                        "Coordinator handshake timed out"
                    );
                }
            }

            let delay = backoff.next_delay();
            tracing::info!(attempt = backoff.attempt(), delay = ?delay, "Reconnecting to coordinator");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Control channel stopped");
    }

    async fn session(&mut self, stream: CoordinatorStream, shutdown: &mut broadcast::Receiver<()>) -> SessionEnd {
        let (mut sink, mut source) = stream.split();
        let mut report_ticker = tokio::time::interval(self.client_rates.window());
        report_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_update(Ok(text.as_str())),
                    Some(Ok(Message::Binary(bytes))) => {
                        self.handle_update(std::str::from_utf8(&bytes).map_err(|_| ControlError::NotUtf8))
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "Coordinator closed the control channel");
                        return SessionEnd::Lost;
                    }
                    // Ping/pong are answered by the protocol layer.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Control channel transport error");
                        return SessionEnd::Lost;
                    }
                    None => return SessionEnd::Lost,
                },
                _ = report_ticker.tick(), if self.config.report_client_rates => {
                    if let Err(e) = self.report_client_rates(&mut sink).await {
                        tracing::warn!(error = %e, "Failed to send client rates");
                        return SessionEnd::Lost;
                    }
                }
                _ = shutdown.recv() => {
                    self.set_state(ConnectionState::Closing);
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Close frame not delivered");
                    }
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    fn handle_update(&self, frame: Result<&str, ControlError>) {
        match frame.and_then(|text| apply_text(&self.table, text, self.config.batch_mode)) {
            Ok(applied) => {
                self.counters.applied.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    kind = applied.kind,
                    routes = applied.routes,
                    version = applied.version,
                    "Applied routing update"
                );
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Discarded control message, routing table unchanged");
            }
        }
    }

    async fn report_client_rates<S>(&mut self, sink: &mut S) -> Result<(), WsError>
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        let (window, counts) = self.client_rates.completed_window_counts();
        if self.last_reported.is_some_and(|last| last >= window) {
            return Ok(());
        }
        self.last_reported = Some(window);

        let window_ms = self.client_rates.window().as_millis().max(1) as u64;
        for (ip, count) in counts {
            let report = Report::ClientRate {
                ip,
                connections_per_second: count.saturating_mul(1000) / window_ms,
            };
            match serde_json::to_string(&report) {
                Ok(json) => sink.send(Message::Text(json.into())).await?,
                Err(e) => tracing::warn!(error = %e, "Failed to encode client rate report"),
            }
        }
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "Control channel state change");
        }
    }
}
