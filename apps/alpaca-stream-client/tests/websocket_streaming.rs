//! WebSocket Streaming Integration Tests
//!
//! Runs a `StreamClient` against a local tokio-tungstenite server speaking
//! the stock data handshake: greeting, `auth`, `authenticated`, subscribe,
//! data, then a server-side close to exercise reconnection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use alpaca_stream_client::{
    ClientConfig, ConnectionState, Credentials, ReconnectConfig, StockDataStream, StreamClient,
    StreamError,
};

const WAIT: Duration = Duration::from_secs(5);

type Server = WebSocketStream<TcpStream>;

fn config() -> ClientConfig {
    ClientConfig::new(Credentials::new("test-key", "test-secret").unwrap()).with_reconnect(
        ReconnectConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            ..ReconnectConfig::default()
        },
    )
}

async fn send(ws: &mut Server, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Next text frame from the client, parsed as JSON.
async fn recv(ws: &mut Server) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => {}
            other => panic!("client went away: {other:?}"),
        }
    }
}

/// Greet, check the auth frame, and acknowledge it.
async fn handshake(ws: &mut Server) -> Value {
    send(ws, json!([{"T": "success", "msg": "connected"}])).await;
    let auth = recv(ws).await;
    send(ws, json!([{"T": "success", "msg": "authenticated"}])).await;
    auth
}

async fn accept(listener: &TcpListener) -> Server {
    let (socket, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(socket).await.unwrap()
}

async fn spawn_client(listener: &TcpListener) -> StreamClient<StockDataStream> {
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let config = config();
    StreamClient::spawn(config.heartbeat, |transport, scheduler| {
        StockDataStream::with_url(&config, url, transport, scheduler)
    })
}

// =============================================================================
// Handshake and Delivery
// =============================================================================

#[tokio::test]
async fn test_queued_subscription_is_sent_after_authentication() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = spawn_client(&listener).await;
    let (trades_tx, mut trades) = mpsc::unbounded_channel();
    client
        .on_trade(move |trade| {
            let _ = trades_tx.send((trade.symbol.clone(), trade.price));
        })
        .unwrap();

    client.subscribe_for_trades(["AAPL"]).unwrap();
    client.connect().unwrap();

    let mut ws = timeout(WAIT, accept(&listener)).await.unwrap();
    let auth = handshake(&mut ws).await;
    assert_eq!(
        auth,
        json!({"action": "auth", "key": "test-key", "secret": "test-secret"})
    );

    let subscribe = timeout(WAIT, recv(&mut ws)).await.unwrap();
    assert_eq!(subscribe, json!({"action": "subscribe", "trades": ["AAPL"]}));
    assert!(client.is_connected());

    send(
        &mut ws,
        json!([
            {"T": "subscription", "trades": ["AAPL"], "quotes": [], "bars": []},
            {
                "T": "t", "S": "AAPL", "i": 1, "x": "V", "p": 150.25, "s": 100,
                "t": "2024-03-12T14:30:00Z"
            }
        ]),
    )
    .await;

    let (symbol, price) = timeout(WAIT, trades.recv()).await.unwrap().unwrap();
    assert_eq!(symbol, "AAPL");
    assert_eq!(price, Decimal::new(15025, 2));

    client.shutdown().await;
}

#[tokio::test]
async fn test_server_close_triggers_reconnect_and_resubscribe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = spawn_client(&listener).await;
    let (reconnects_tx, mut reconnects) = mpsc::unbounded_channel();
    client
        .on_reconnecting(move |event| {
            let _ = reconnects_tx.send(event.attempt);
        })
        .unwrap();

    client.connect().unwrap();
    let mut first = timeout(WAIT, accept(&listener)).await.unwrap();
    handshake(&mut first).await;
    timeout(WAIT, client.wait_for_state(ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    client.subscribe_for_quotes(["MSFT", "SPY"]).unwrap();
    let subscribe = timeout(WAIT, recv(&mut first)).await.unwrap();
    assert_eq!(subscribe, json!({"action": "subscribe", "quotes": ["MSFT", "SPY"]}));

    first.close(None).await.unwrap();
    drop(first);

    assert_eq!(timeout(WAIT, reconnects.recv()).await.unwrap(), Some(1));

    let mut second = timeout(WAIT, accept(&listener)).await.unwrap();
    handshake(&mut second).await;
    let resubscribe = timeout(WAIT, recv(&mut second)).await.unwrap();
    assert_eq!(
        resubscribe,
        json!({"action": "subscribe", "quotes": ["MSFT", "SPY"]})
    );

    timeout(WAIT, client.wait_for_state(ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();
    client.shutdown().await;
}

// =============================================================================
// Authentication Failure
// =============================================================================

#[tokio::test]
async fn test_auth_failure_stops_reconnecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = spawn_client(&listener).await;
    let (errors_tx, mut errors) = mpsc::unbounded_channel();
    client
        .on_error(move |error| {
            let _ = errors_tx.send(error.clone());
        })
        .unwrap();

    client.connect().unwrap();
    let mut ws = timeout(WAIT, accept(&listener)).await.unwrap();
    send(&mut ws, json!([{"T": "success", "msg": "connected"}])).await;
    let _auth = recv(&mut ws).await;
    send(&mut ws, json!([{"T": "error", "code": 402, "msg": "auth failed"}])).await;

    let error = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert!(matches!(error, StreamError::Authentication { code: Some(402), .. }));
    timeout(WAIT, client.wait_for_state(ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    // No second connection within several backoff periods.
    assert!(
        timeout(Duration::from_millis(500), listener.accept())
            .await
            .is_err()
    );
    client.shutdown().await;
}
