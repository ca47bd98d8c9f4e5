//! WebSocket Engine Adapter Integration Tests
//!
//! Drives the adapter against a local fixture server instead of a live
//! feed: asserts the subscribe handshake, delivery order, opaque
//! passthrough, and end-of-stream reporting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use stream_session_manager::{
    EngineError, Received, StreamingEngine, SubscriptionSpec, WsEngine, WsEngineConfig,
};

/// Accept one connection, capture its subscribe message, deliver the
/// given frames, then close. Returns the captured subscribe text.
async fn spawn_fixture(frames: Vec<String>) -> (SocketAddr, JoinHandle<String>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let subscribe = match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => text.as_str().to_string(),
            other => panic!("expected subscribe text frame, got {other:?}"),
        };

        for frame in frames {
            ws.send(Message::text(frame)).await.unwrap();
        }
        ws.close(None).await.unwrap();

        subscribe
    });

    (addr, server)
}

fn engine_for(addr: SocketAddr) -> WsEngine {
    WsEngine::new(WsEngineConfig {
        url: format!("ws://{addr}/ws"),
        ..WsEngineConfig::default()
    })
}

fn btc_ticker() -> SubscriptionSpec {
    "coinbase.spot.ticker.BTC-USD".parse().unwrap()
}

async fn next_event(engine: &WsEngine, handle: &stream_session_manager::StreamHandle) -> Value {
    match engine
        .receive(handle, Duration::from_secs(2))
        .await
        .unwrap()
    {
        Received::Event(event) => event.into_json(),
        other => panic!("expected event, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribes_with_the_channel_string() {
    let (addr, server) = spawn_fixture(vec![]).await;
    let engine = engine_for(addr);

    let handle = engine.create_handle(&btc_ticker()).await.unwrap();

    let subscribe = server.await.unwrap();
    let message: Value = serde_json::from_str(&subscribe).unwrap();
    assert_eq!(message["event"], json!("subscribe"));
    assert_eq!(message["channel"], json!("coinbase.spot.ticker.BTC-USD"));

    engine.destroy_handle(handle).await;
    assert_eq!(engine.open_handle_count(), 0);
}

#[tokio::test]
async fn delivers_frames_in_order_then_reports_closed() {
    let frames = vec![
        r#"{"p":100}"#.to_string(),
        r#"{"p":101}"#.to_string(),
        r#"{"p":102}"#.to_string(),
    ];
    let (addr, server) = spawn_fixture(frames).await;
    let engine = engine_for(addr);

    let handle = engine.create_handle(&btc_ticker()).await.unwrap();

    for expected in 100..=102 {
        let event = next_event(&engine, &handle).await;
        assert_eq!(event["p"], json!(expected));
    }

    // Server closed: end-of-stream is reported once buffered events are
    // drained.
    assert!(matches!(
        engine
            .receive(&handle, Duration::from_secs(2))
            .await
            .unwrap(),
        Received::Closed
    ));

    server.await.unwrap();
    engine.destroy_handle(handle).await;
}

#[tokio::test]
async fn non_json_frames_pass_through_opaquely() {
    let (addr, server) = spawn_fixture(vec!["not json".to_string()]).await;
    let engine = engine_for(addr);

    let handle = engine.create_handle(&btc_ticker()).await.unwrap();
    let event = next_event(&engine, &handle).await;
    assert_eq!(event, json!("not json"));

    server.await.unwrap();
    engine.destroy_handle(handle).await;
}

#[tokio::test]
async fn quiet_stream_times_out_without_ending() {
    // A fixture that accepts, reads the subscribe, then stays silent.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _subscribe = ws.next().await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let engine = engine_for(addr);
    let handle = engine.create_handle(&btc_ticker()).await.unwrap();

    // Nothing delivered yet: a bounded receive must come back as a
    // timeout, not a hang or a close.
    assert!(matches!(
        engine
            .receive(&handle, Duration::from_millis(50))
            .await
            .unwrap(),
        Received::Timeout
    ));

    engine.destroy_handle(handle).await;
    server.abort();
}

#[tokio::test]
async fn unreachable_feed_is_unavailable() {
    let engine = WsEngine::new(WsEngineConfig {
        url: "ws://127.0.0.1:9/ws".to_string(),
        ..WsEngineConfig::default()
    });

    assert!(matches!(
        engine.create_handle(&btc_ticker()).await,
        Err(EngineError::Unavailable(_))
    ));
}
