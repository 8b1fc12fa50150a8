//! Live Tick Client
//!
//! Watches one symbol on the quote socket at `<live_url>/<symbol>`.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──subscribe──► Connecting ──handshake──► Open
//!                        ▲   │                   │
//!                  delay │   └──── failure ──────┤
//!                        │                       ▼
//!                        └──── retries left ── Disconnected
//!                                                │ budget spent
//!                                                ▼
//!                                              Failed
//! ```
//!
//! Each subscription runs as one spawned connection task holding the
//! [`Generation`] it was started under. Switching symbols supersedes the
//! generation before the old task is stopped, so anything the old task
//! still tries to write is rejected by the store.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::TickCodec;
use super::messages::LiveMessage;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::store::TickStateStore;
use crate::domain::ticks::{Generation, TickSnapshot, TickSubscription};
use crate::infrastructure::config::LiveSettings;
use crate::infrastructure::metrics::{self, TickOutcome};

type TickSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection attempt.
///
/// These never reach the consumer directly; they drive the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum LiveStreamError {
    /// Handshake or transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// The server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,
}

impl LiveStreamError {
    /// Whether retrying the same request can never succeed.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(WsError::Url(_) | WsError::HttpFormat(_))
        )
    }
}

// =============================================================================
// Live Tick Stream
// =============================================================================

struct Connection {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// One consumer's live price subscription.
///
/// At most one connection is alive at a time. Dropping the stream cancels
/// the connection without waiting for it.
pub struct LiveTickStream {
    settings: LiveSettings,
    store: Arc<TickStateStore>,
    codec: TickCodec,
    connection: Option<Connection>,
}

impl LiveTickStream {
    /// Create an idle stream.
    #[must_use]
    pub fn new(settings: LiveSettings) -> Self {
        Self {
            settings,
            store: Arc::new(TickStateStore::new()),
            codec: TickCodec::new(),
            connection: None,
        }
    }

    /// Watch `identifier`, replacing any current subscription.
    ///
    /// The previous connection is closed before the new one is opened and
    /// the retry count starts again from zero. A blank identifier leaves
    /// the stream idle.
    pub async fn subscribe(&mut self, identifier: &str) -> watch::Receiver<TickSnapshot> {
        let generation = self.store.apply(|sub| sub.begin(identifier));
        self.stop_connection().await;

        if let (Some(generation), Some(symbol)) = (generation, self.store.identifier()) {
            tracing::info!(symbol = %symbol, %generation, "Subscribing to live ticks");
            self.spawn_connection(symbol, generation);
        }

        self.store.watch()
    }

    /// Close the subscription intentionally.
    ///
    /// Idempotent: calling it again does nothing and schedules nothing.
    pub async fn unsubscribe(&mut self) {
        let was_active = self.store.apply(TickSubscription::retire);
        self.stop_connection().await;

        if was_active {
            tracing::info!("Unsubscribed from live ticks");
        }
    }

    /// Resubscribe to the current symbol with a fresh retry budget.
    ///
    /// Returns `false` if there is no symbol to resubscribe to.
    pub async fn reset(&mut self) -> bool {
        let Some(symbol) = self.store.identifier() else {
            return false;
        };
        self.subscribe(&symbol).await;
        true
    }

    /// New receiver for snapshot changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<TickSnapshot> {
        self.store.watch()
    }

    /// Latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> TickSnapshot {
        self.store.snapshot()
    }

    fn spawn_connection(&mut self, symbol: String, generation: Generation) {
        let cancel = CancellationToken::new();
        let task = ConnectionTask {
            url: self.settings.symbol_url(&symbol),
            symbol,
            generation,
            store: Arc::clone(&self.store),
            codec: self.codec.clone(),
            reconnect: ReconnectConfig::from_live_settings(&self.settings),
            cancel: cancel.clone(),
        };

        let handle = tokio::spawn(task.run());
        self.connection = Some(Connection { cancel, handle });
    }

    async fn stop_connection(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        connection.cancel.cancel();
        if let Err(e) = connection.handle.await {
            tracing::error!(error = %e, "Live tick task failed");
        }
    }
}

impl Drop for LiveTickStream {
    fn drop(&mut self) {
        if let Some(connection) = &self.connection {
            connection.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for LiveTickStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveTickStream")
            .field("settings", &self.settings)
            .field("snapshot", &self.store.snapshot())
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

// =============================================================================
// Connection Task
// =============================================================================

struct ConnectionTask {
    url: String,
    symbol: String,
    generation: Generation,
    store: Arc<TickStateStore>,
    codec: TickCodec,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
}

impl ConnectionTask {
    /// Connect, read and retry until cancelled, superseded or out of budget.
    async fn run(self) {
        let mut policy = ReconnectPolicy::new(self.reconnect);

        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let Err(e) = self.connect_and_read(&mut policy).await else {
                // Cancelled or superseded
                return;
            };

            if e.is_permanent() {
                let reason = format!("live prices unavailable for {}: {e}", self.symbol);
                if self.store.apply(|sub| sub.mark_failed(self.generation, reason)) {
                    metrics::record_failure();
                    tracing::warn!(symbol = %self.symbol, error = %e, "Live tick request is invalid, not retrying");
                }
                return;
            }

            let delay = policy.next_delay();
            let attempt = policy.attempt_count();
            tracing::warn!(symbol = %self.symbol, attempt, error = %e, "Live tick connection lost");

            let applied = self.store.apply(|sub| {
                sub.mark_disconnected(self.generation, attempt, delay.is_none())
            });
            if !applied {
                return;
            }

            let Some(delay) = delay else {
                metrics::record_failure();
                tracing::warn!(
                    symbol = %self.symbol,
                    attempts = attempt,
                    "Live tick retry budget exhausted"
                );
                return;
            };

            metrics::record_reconnect();
            tracing::info!(
                symbol = %self.symbol,
                attempt,
                delay_ms = delay.as_millis(),
                "Reconnecting to live ticks"
            );

            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            if !self.store.apply(|sub| sub.mark_connecting(self.generation)) {
                return;
            }
        }
    }

    /// One connection attempt. `Ok` means stop without retrying.
    async fn connect_and_read(&self, policy: &mut ReconnectPolicy) -> Result<(), LiveStreamError> {
        tracing::debug!(url = %self.url, generation = %self.generation, "Connecting to quote socket");

        let mut socket = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(self.url.as_str()) => result?.0,
        };

        if !self.store.apply(|sub| sub.mark_open(self.generation)) {
            // Superseded during the handshake
            let _ = socket.close(None).await;
            return Ok(());
        }

        policy.reset();
        metrics::adjust_tick_connections(1.0);
        tracing::info!(symbol = %self.symbol, "Live tick connection open");

        let result = self.read_loop(&mut socket).await;

        metrics::adjust_tick_connections(-1.0);
        result
    }

    async fn read_loop(&self, socket: &mut TickSocket) -> Result<(), LiveStreamError> {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = socket.close(None).await;
                    return Ok(());
                }
                msg = socket.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text(&text) {
                                let _ = socket.close(None).await;
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(symbol = %self.symbol, ?frame, "Server sent close frame");
                            return Err(LiveStreamError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Binary and control frames carry no ticks
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(LiveStreamError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Apply one text frame. Returns `false` once this connection has been
    /// superseded.
    fn handle_text(&self, text: &str) -> bool {
        let message = match self.codec.decode(text) {
            Ok(message) => message,
            Err(e) => {
                metrics::record_tick(TickOutcome::Malformed);
                tracing::warn!(symbol = %self.symbol, error = %e, "Dropping malformed tick payload");
                return true;
            }
        };

        match message {
            LiveMessage::Status(status) => {
                metrics::record_tick(TickOutcome::Control);
                tracing::debug!(
                    symbol = %self.symbol,
                    status = %status.status,
                    tickers = ?status.tickers,
                    "Quote socket acknowledged"
                );
            }
            LiveMessage::Error(error) => {
                let generation = self.generation;
                let message = error.error;
                if self.store.apply(|sub| sub.record_error(generation, message.clone())) {
                    metrics::record_tick(TickOutcome::AppError);
                    tracing::warn!(symbol = %self.symbol, error = %message, "Quote socket reported an error");
                } else {
                    metrics::record_tick(TickOutcome::Stale);
                }
            }
            LiveMessage::Tick(tick) if !tick.is_for(&self.symbol) => {
                metrics::record_tick(TickOutcome::Stale);
                tracing::debug!(
                    symbol = %self.symbol,
                    received = ?tick.id,
                    "Discarding tick for another symbol"
                );
            }
            LiveMessage::Tick(tick) => {
                let generation = self.generation;
                if self.store.apply(|sub| sub.record_sample(generation, tick.into_sample())) {
                    metrics::record_tick(TickOutcome::Applied);
                } else {
                    metrics::record_tick(TickOutcome::Stale);
                    tracing::debug!(symbol = %self.symbol, %generation, "Discarding stale tick");
                }
            }
        }

        self.store.is_current(self.generation)
    }
}
