//! Live Tick Integration Tests
//!
//! Runs `LiveTickStream` against a local WebSocket server. The server hands
//! every accepted TCP connection to the test, which decides whether to
//! complete the handshake, hold it, or drop it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use surge_stream::infrastructure::config::parse_url;
use surge_stream::{ConnectionState, LiveSettings, LiveTickStream, TickSnapshot};

// =============================================================================
// Test Server
// =============================================================================

type ServerSocket = WebSocketStream<TcpStream>;

struct QuoteServer {
    addr: SocketAddr,
    incoming: mpsc::UnboundedReceiver<TcpStream>,
}

impl QuoteServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, incoming) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                if tx.send(tcp).is_err() {
                    break;
                }
            }
        });

        Self { addr, incoming }
    }

    fn settings(&self, reconnect_delay: Duration) -> LiveSettings {
        LiveSettings {
            live_url: parse_url(
                "SURGE_LIVE_URL",
                &format!("ws://{}/ws/live", self.addr),
                &["ws"],
            )
            .unwrap(),
            reconnect_delay,
            max_reconnect_attempts: 5,
        }
    }

    /// Next raw TCP connection, without a handshake.
    async fn next_tcp(&mut self) -> TcpStream {
        timeout(Duration::from_secs(5), self.incoming.recv())
            .await
            .expect("no connection attempt")
            .expect("listener stopped")
    }

    /// Next connection, upgraded. Returns the request path.
    async fn accept(&mut self) -> (String, ServerSocket) {
        let tcp = self.next_tcp().await;
        handshake(tcp).await.unwrap()
    }

    /// Whether no connection attempt arrives within `window`.
    async fn quiet_for(&mut self, window: Duration) -> bool {
        timeout(window, self.incoming.recv()).await.is_err()
    }
}

async fn handshake(
    tcp: TcpStream,
) -> Result<(String, ServerSocket), tokio_tungstenite::tungstenite::Error> {
    let mut path = String::new();
    let capture = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        path = req.uri().path().to_string();
        Ok(resp)
    };
    let ws = tokio_tungstenite::accept_hdr_async(tcp, capture).await?;
    Ok((path, ws))
}

async fn send_json(ws: &mut ServerSocket, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

fn tick(symbol: &str, price: &str) -> serde_json::Value {
    serde_json::json!({
        "id": symbol,
        "price": price.parse::<f64>().unwrap(),
        "change": 1.25,
        "changePercent": 0.66,
        "currency": "USD",
        "exchange": "NMS",
        "market_cap": 2_950_000_000_000.0,
        "volume": 48_213,
        "timestamp": "2024-05-01T14:30:00.123456"
    })
}

fn price(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

async fn wait_for(
    rx: &mut watch::Receiver<TickSnapshot>,
    pred: impl FnMut(&TickSnapshot) -> bool,
) -> TickSnapshot {
    timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("snapshot condition not reached")
        .expect("store dropped")
        .clone()
}

async fn wait_open(rx: &mut watch::Receiver<TickSnapshot>) -> TickSnapshot {
    wait_for(rx, |s| s.connection_state == ConnectionState::Open).await
}

// =============================================================================
// Samples
// =============================================================================

#[tokio::test]
async fn sample_updates_snapshot() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(20)));

    let mut rx = stream.subscribe(" aapl ").await;
    assert_eq!(rx.borrow().connection_state, ConnectionState::Connecting);

    let (path, mut ws) = server.accept().await;
    assert_eq!(path, "/ws/live/AAPL");
    wait_open(&mut rx).await;

    send_json(
        &mut ws,
        serde_json::json!({"status": "connected", "tickers": ["AAPL"], "message": "Live price stream started"}),
    )
    .await;
    send_json(&mut ws, tick("AAPL", "189.5")).await;

    let snap = wait_for(&mut rx, |s| s.sample.is_some()).await;
    assert!(snap.is_live());
    assert_eq!(snap.identifier.as_deref(), Some("AAPL"));
    assert_eq!(snap.price(), Some(price("189.5")));
    assert_eq!(snap.change_percent(), Some(price("0.66")));
    assert_eq!(snap.volume(), Some(48_213));
    assert_eq!(snap.retry_count, 0);
    assert!(snap.error.is_none());
    assert!(snap.updated_at.is_some());
}

#[tokio::test]
async fn symbol_with_space_is_escaped_in_path() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(20)));
    let mut rx = stream.subscribe("brk b").await;

    let (path, mut ws) = server.accept().await;
    assert_eq!(path, "/ws/live/BRK%20B");
    wait_open(&mut rx).await;

    send_json(&mut ws, tick("BRK B", "412.5")).await;
    let snap = wait_for(&mut rx, |s| s.sample.is_some()).await;
    assert_eq!(snap.identifier.as_deref(), Some("BRK B"));
    assert_eq!(snap.price(), Some(price("412.5")));
    assert_eq!(snap.retry_count, 0);
}

#[tokio::test]
async fn malformed_payload_and_app_error_keep_connection() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(20)));
    let mut rx = stream.subscribe("AAPL").await;

    let (_, mut ws) = server.accept().await;
    send_json(&mut ws, tick("AAPL", "189.5")).await;
    wait_for(&mut rx, |s| s.sample.is_some()).await;

    ws.send(Message::Text("{definitely not json".into())).await.unwrap();
    send_json(&mut ws, serde_json::json!({"error": "Error fetching AAPL: timeout"})).await;

    let snap = wait_for(&mut rx, |s| s.error.is_some()).await;
    assert_eq!(snap.error.as_deref(), Some("Error fetching AAPL: timeout"));
    assert_eq!(snap.connection_state, ConnectionState::Open);
    assert_eq!(snap.price(), Some(price("189.5")));
    assert_eq!(snap.retry_count, 0);

    send_json(&mut ws, tick("AAPL", "190.25")).await;
    let snap = wait_for(&mut rx, |s| s.price() == Some(price("190.25"))).await;
    assert!(snap.error.is_none());

    // Neither message counted as a connection failure
    assert!(server.quiet_for(Duration::from_millis(100)).await);
}

// =============================================================================
// Identity Guard
// =============================================================================

#[tokio::test]
async fn late_tick_for_previous_symbol_is_ignored() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(20)));

    let mut rx = stream.subscribe("AAPL").await;
    let (path_a, mut ws_a) = server.accept().await;
    assert_eq!(path_a, "/ws/live/AAPL");
    wait_open(&mut rx).await;

    let mut rx = stream.subscribe("MSFT").await;
    let (path_b, mut ws_b) = server.accept().await;
    assert_eq!(path_b, "/ws/live/MSFT");
    wait_open(&mut rx).await;

    // The old socket was closed intentionally; a late write goes nowhere
    let _ = ws_a.send(Message::Text(tick("AAPL", "189.5").to_string().into())).await;

    send_json(&mut ws_b, tick("MSFT", "412.0")).await;
    let snap = wait_for(&mut rx, |s| s.sample.is_some()).await;
    assert_eq!(snap.identifier.as_deref(), Some("MSFT"));
    assert_eq!(snap.price(), Some(price("412.0")));

    // A sample tagged with the previous symbol on the live socket is stale too
    send_json(&mut ws_b, tick("AAPL", "189.5")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stream.snapshot().price(), Some(price("412.0")));

    // Only one reconnect-free connection per symbol
    assert!(server.quiet_for(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn switching_while_connecting_abandons_pending_handshake() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(20)));

    let rx = stream.subscribe("AAPL").await;
    let pending = server.next_tcp().await;
    assert_eq!(rx.borrow().connection_state, ConnectionState::Connecting);

    let mut rx = stream.subscribe("MSFT").await;
    let (path, _ws) = server.accept().await;
    assert_eq!(path, "/ws/live/MSFT");
    let opened = wait_open(&mut rx).await;

    // Finishing the abandoned handshake must not touch the MSFT state
    if let Ok((_, mut late)) = handshake(pending).await {
        let _ = late
            .send(Message::Text(tick("AAPL", "189.5").to_string().into()))
            .await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snap = stream.snapshot();
    assert_eq!(snap.identifier.as_deref(), Some("MSFT"));
    assert_eq!(snap.connection_state, ConnectionState::Open);
    assert_eq!(snap.generation, opened.generation);
    assert!(snap.sample.is_none());
}

// =============================================================================
// Reconnection
// =============================================================================

#[tokio::test]
async fn five_handshake_failures_fail_until_reset() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(20)));
    let mut rx = stream.subscribe("AAPL").await;

    for _ in 0..5 {
        drop(server.next_tcp().await);
    }

    let snap = wait_for(&mut rx, |s| s.connection_state == ConnectionState::Failed).await;
    assert_eq!(snap.retry_count, 5);
    assert!(snap.needs_refresh());
    assert!(snap.error.as_deref().unwrap().contains("5 attempts"));

    // No sixth attempt is scheduled
    assert!(server.quiet_for(Duration::from_millis(300)).await);

    // Manual refresh starts over with a fresh budget
    assert!(stream.reset().await);
    let mut rx = stream.watch();
    let snap = rx.borrow().clone();
    assert_eq!(snap.connection_state, ConnectionState::Connecting);
    assert_eq!(snap.retry_count, 0);

    let (path, _ws) = server.accept().await;
    assert_eq!(path, "/ws/live/AAPL");
    let snap = wait_open(&mut rx).await;
    assert_eq!(snap.retry_count, 0);
    assert!(snap.error.is_none());
}

#[tokio::test]
async fn server_close_triggers_reconnect() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(20)));
    let mut rx = stream.subscribe("AAPL").await;

    let (_, mut ws) = server.accept().await;
    wait_open(&mut rx).await;
    ws.close(None).await.unwrap();

    let (path, _ws) = server.accept().await;
    assert_eq!(path, "/ws/live/AAPL");

    let snap = wait_open(&mut rx).await;
    assert_eq!(snap.retry_count, 0);
}

#[tokio::test]
async fn retry_count_tracks_consecutive_failures() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(200)));
    let mut rx = stream.subscribe("AAPL").await;

    drop(server.next_tcp().await);
    let snap = wait_for(&mut rx, |s| s.connection_state == ConnectionState::Disconnected).await;
    assert_eq!(snap.retry_count, 1);

    drop(server.next_tcp().await);
    let snap = wait_for(&mut rx, |s| s.retry_count == 2).await;
    assert_eq!(snap.connection_state, ConnectionState::Disconnected);
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn unsubscribe_twice_is_noop() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(20)));
    let mut rx = stream.subscribe("AAPL").await;

    let (_, mut ws) = server.accept().await;
    wait_open(&mut rx).await;

    stream.unsubscribe().await;
    let snap = stream.snapshot();
    assert_eq!(snap.connection_state, ConnectionState::Idle);
    assert!(snap.identifier.is_none());

    stream.unsubscribe().await;
    assert_eq!(stream.snapshot().connection_state, ConnectionState::Idle);

    // The client closed the socket and nothing reconnects
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert!(server.quiet_for(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn unsubscribe_cancels_pending_reconnect() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(300)));
    let mut rx = stream.subscribe("AAPL").await;

    drop(server.next_tcp().await);
    wait_for(&mut rx, |s| s.connection_state == ConnectionState::Disconnected).await;

    stream.unsubscribe().await;
    assert_eq!(stream.snapshot().connection_state, ConnectionState::Idle);
    assert!(server.quiet_for(Duration::from_millis(600)).await);
}

#[tokio::test]
async fn dropping_stream_closes_connection() {
    let mut server = QuoteServer::start().await;
    let mut stream = LiveTickStream::new(server.settings(Duration::from_millis(20)));
    let mut rx = stream.subscribe("AAPL").await;

    let (_, mut ws) = server.accept().await;
    wait_open(&mut rx).await;
    drop(stream);

    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert!(server.quiet_for(Duration::from_millis(200)).await);
}
