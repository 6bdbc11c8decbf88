//! Gateway session integration tests
//!
//! Each test scripts an in-process mock gateway and drives a real
//! `GatewaySession` against it.
//!
//! Run with: cargo test -p integration-tests --test session_tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chat_common::RestError;
use chat_core::{ClientEvent, EntityCache, EntityKind, EventCategory, MessageReceiver, VoiceChannel};
use chat_gateway::voice::{VoiceConnectRequest, VoiceConnection};
use chat_gateway::{GatewayError, GatewayResult, SessionState, VoiceConnector};
use integration_tests::{
    ready_payload, serve_http, test_config, test_session, test_session_with_voice,
    wait_for_state, zlib, EventRecorder, MockGateway,
};
use parking_lot::Mutex;
use serde_json::json;

// ============================================================================
// Connect and Ready
// ============================================================================

#[tokio::test]
async fn test_ready_starts_heartbeat_with_server_interval() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, cache) = test_session(test_config(&gateway.url(), true))?;

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_blocking().await })
    };

    let mut conn = gateway.next_connection().await?;
    let identify = conn.recv_op(2).await?;
    assert_eq!(identify["d"]["token"], "T");
    assert_eq!(identify["d"]["v"], 3);
    assert_eq!(identify["d"]["compress"], true);

    conn.send_dispatch("READY", 1, ready_payload("s1", 40_000))
        .await?;
    connecting.await??;

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.heartbeat_interval(), Some(Duration::from_millis(40_000)));
    assert_eq!(session.session_id().as_deref(), Some("s1"));
    assert!(cache.contains(EntityKind::Server, "g1"));

    // Status is pushed right after READY
    let status = conn.recv_op(3).await?;
    assert_eq!(status["d"]["game"]["name"], serde_json::Value::Null);

    session.close_blocking().await;
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_pulses_while_ready() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, _cache) = test_session(test_config(&gateway.url(), true))?;
    session.connect(|_| {})?;

    let mut conn = gateway.next_connection().await?;
    conn.handshake("s1", 100).await?;

    let first = conn.recv_op(1).await?;
    let second = conn.recv_op(1).await?;
    let third = conn.recv_op(1).await?;
    let stamps: Vec<u64> = [first, second, third]
        .iter()
        .map(|f| f["d"].as_u64().unwrap())
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "{stamps:?}");

    session.close_blocking().await;
    assert!(session.heartbeat_interval().is_none());
    Ok(())
}

#[tokio::test]
async fn test_compressed_ready_is_decoded() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, _cache) = test_session(test_config(&gateway.url(), true))?;
    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_blocking().await })
    };

    let mut conn = gateway.next_connection().await?;
    conn.recv_op(2).await?;
    conn.send_compressed(&json!({"op": 0, "t": "READY", "s": 1, "d": ready_payload("s1", 40_000)}))
        .await?;

    connecting.await??;
    assert_eq!(session.state(), SessionState::Ready);

    session.close_blocking().await;
    Ok(())
}

#[tokio::test]
async fn test_close_before_ready_fails_readiness() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, _cache) = test_session(test_config(&gateway.url(), false))?;
    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_blocking().await })
    };

    let mut conn = gateway.next_connection().await?;
    conn.recv_op(2).await?;
    conn.close(4004, "Authentication failed").await?;

    let result = connecting.await?;
    assert!(matches!(result, Err(GatewayError::ClosedBeforeReady)), "{result:?}");
    wait_for_state(&session, SessionState::Disconnected).await?;
    Ok(())
}

#[tokio::test]
async fn test_connect_failure_resolves_readiness() -> Result<()> {
    // Bind and drop to get a port nothing listens on
    let addr = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?;
    let (session, _cache) = test_session(test_config(&format!("ws://{addr}"), true))?;

    let result = tokio::time::timeout(Duration::from_secs(5), session.connect_blocking()).await?;
    assert!(matches!(result, Err(GatewayError::Transport(_))), "{result:?}");
    assert_eq!(session.state(), SessionState::Disconnected);
    Ok(())
}

// ============================================================================
// Reconnect
// ============================================================================

#[tokio::test]
async fn test_resume_hint_reconnects_with_resume() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    // Auto-reconnect off: only the hint may bring the session back
    let (session, _cache) = test_session(test_config(&gateway.url(), false))?;
    let recorder = EventRecorder::attach(&session);
    session.connect_blocking_in_background();

    let mut first = gateway.next_connection().await?;
    first.handshake("s1", 40_000).await?;
    wait_for_state(&session, SessionState::Ready).await?;

    first
        .send_json(&json!({"op": 7, "d": {"url": gateway.url()}}))
        .await?;
    first
        .send_dispatch("MESSAGE_CREATE", 2, json!({"id": "m1", "channel_id": "c1", "content": "x"}))
        .await?;
    first.close(4000, "reconnect").await?;

    let mut second = gateway.next_connection().await?;
    let resume = second.recv_json().await?;
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["session_id"], "s1");
    assert_eq!(resume["d"]["token"], "T");
    assert_eq!(resume["d"]["seq"], 2);

    second
        .send_dispatch("READY", 3, ready_payload("s1", 40_000))
        .await?;
    recorder.wait_for(&session, "RESUMED").await?;
    wait_for_state(&session, SessionState::Ready).await?;

    // The hint was used up; the next remote close is terminal
    second.close(4000, "bye").await?;
    wait_for_state(&session, SessionState::Disconnected).await?;
    gateway.expect_no_connection(Duration::from_millis(300)).await?;

    let types = recorder.event_types();
    let ready_count = types.iter().filter(|t| **t == "READY").count();
    assert_eq!(ready_count, 1, "{types:?}");
    Ok(())
}

#[tokio::test]
async fn test_remote_close_with_auto_reconnect_identifies_again() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, _cache) = test_session(test_config(&gateway.url(), true))?;
    session.connect_blocking_in_background();

    let mut first = gateway.next_connection().await?;
    first.handshake("s1", 40_000).await?;
    wait_for_state(&session, SessionState::Ready).await?;
    first.close(4000, "server restart").await?;

    let mut second = gateway.next_connection().await?;
    let identify = second.recv_json().await?;
    assert_eq!(identify["op"], 2);

    session.close_blocking().await;
    Ok(())
}

#[tokio::test]
async fn test_corrupt_frame_triggers_one_fresh_reconnect() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    // Corrupt streams reconnect even with auto-reconnect off
    let (session, _cache) = test_session(test_config(&gateway.url(), false))?;
    let recorder = EventRecorder::attach(&session);
    session.connect_blocking_in_background();

    let mut first = gateway.next_connection().await?;
    first.handshake("s1", 40_000).await?;
    wait_for_state(&session, SessionState::Ready).await?;

    let compressed = zlib(br#"{"op":0,"t":"TYPING_START","d":{}}"#)?;
    first
        .send_binary(compressed[..compressed.len() / 2].to_vec())
        .await?;
    assert_eq!(first.recv_close().await?, Some(1000));

    let mut second = gateway.next_connection().await?;
    let identify = second.recv_json().await?;
    assert_eq!(identify["op"], 2);
    gateway.expect_no_connection(Duration::from_millis(300)).await?;

    match recorder.wait_for(&session, "DISCONNECTED").await? {
        ClientEvent::Disconnected(e) => assert!(!e.remote),
        other => panic!("unexpected event {other:?}"),
    }

    session.close_blocking().await;
    Ok(())
}

#[tokio::test]
async fn test_malformed_text_frame_is_skipped() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, _cache) = test_session(test_config(&gateway.url(), false))?;
    let recorder = EventRecorder::attach(&session);
    session.connect_blocking_in_background();

    let mut conn = gateway.next_connection().await?;
    conn.handshake("s1", 40_000).await?;
    conn.send_json(&json!("not an envelope")).await?;
    conn.send_dispatch("MESSAGE_CREATE", 2, json!({"id": "m1", "channel_id": "c1", "content": "still here"}))
        .await?;

    recorder.wait_for(&session, "MESSAGE_CREATED").await?;
    assert_eq!(session.state(), SessionState::Ready);

    session.close_blocking().await;
    Ok(())
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_listener_order_matches_arrival_order() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, _cache) = test_session(test_config(&gateway.url(), false))?;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.subscribe(
        EventCategory::Message,
        Arc::new(move |event: &ClientEvent| {
            if let ClientEvent::MessageCreated(e) = event {
                // A slow first delivery must not reorder the rest
                if e.message_id == "m1" {
                    std::thread::sleep(Duration::from_millis(100));
                }
                sink.lock().push(e.message_id.clone());
            }
        }),
    );
    session.connect_blocking_in_background();

    let mut conn = gateway.next_connection().await?;
    conn.handshake("s1", 40_000).await?;
    for (seq, id) in [(2, "m1"), (3, "m2"), (4, "m3")] {
        conn.send_dispatch("MESSAGE_CREATE", seq, json!({"id": id, "channel_id": "c1", "content": id}))
            .await?;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while seen.lock().len() < 3 && tokio::time::Instant::now() < deadline {
        session.flush_listeners().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*seen.lock(), vec!["m1", "m2", "m3"]);

    session.close_blocking().await;
    Ok(())
}

#[tokio::test]
async fn test_private_message_receiver_is_user() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, _cache) = test_session(test_config(&gateway.url(), false))?;
    let recorder = EventRecorder::attach(&session);
    session.connect_blocking_in_background();

    let mut conn = gateway.next_connection().await?;
    conn.recv_op(2).await?;
    let mut ready = ready_payload("s1", 40_000);
    ready["private_channels"] = json!([{"id": "dm1", "recipient": {"id": "u2"}}]);
    conn.send_dispatch("READY", 1, ready).await?;
    conn.send_dispatch("MESSAGE_CREATE", 2, json!({"id": "m1", "channel_id": "dm1", "content": "hi"}))
        .await?;

    match recorder.wait_for(&session, "MESSAGE_CREATED").await? {
        ClientEvent::MessageCreated(e) => {
            assert_eq!(e.receiver, MessageReceiver::User("u2".to_string()));
        }
        other => panic!("unexpected event {other:?}"),
    }

    session.close_blocking().await;
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Default)]
struct CountingConnector {
    opens: AtomicUsize,
    last: Mutex<Option<VoiceConnectRequest>>,
}

impl VoiceConnector for CountingConnector {
    fn open(&self, request: VoiceConnectRequest) -> GatewayResult<VoiceConnection> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let url = request.endpoint.clone();
        *self.last.lock() = Some(request);
        Ok(VoiceConnection::new(url, None))
    }
}

#[tokio::test]
async fn test_voice_handshake_opens_transport_once() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let connector = Arc::new(CountingConnector::default());
    let session = test_session_with_voice(test_config(&gateway.url(), false), connector.clone())?;
    let recorder = EventRecorder::attach(&session);
    session.connect_blocking_in_background();

    let mut conn = gateway.next_connection().await?;
    conn.handshake("s1", 40_000).await?;
    wait_for_state(&session, SessionState::Ready).await?;

    session.begin_voice_handshake(VoiceChannel::new("vc1", "g1"))?;
    let request = conn.recv_op(4).await?;
    assert_eq!(request["d"]["channel_id"], "vc1");
    assert_eq!(request["d"]["guild_id"], "g1");

    conn.send_dispatch("VOICE_STATE_UPDATE", 2, json!({"user_id": "me", "session_id": "vs1"}))
        .await?;
    conn.send_dispatch(
        "VOICE_SERVER_UPDATE",
        3,
        json!({"token": "vt", "endpoint": "voice.example:80", "guild_id": "g1"}),
    )
    .await?;
    // Repeats after completion must not reopen
    conn.send_dispatch("VOICE_STATE_UPDATE", 4, json!({"user_id": "me", "session_id": "vs1"}))
        .await?;

    recorder.wait_for(&session, "VOICE_CONNECTED").await?;
    session.flush_listeners().await;
    assert_eq!(connector.opens.load(Ordering::SeqCst), 1);

    let opened = connector.last.lock().clone().unwrap();
    assert_eq!(opened.session_id, "vs1");
    assert_eq!(opened.user_id, "me");
    assert_eq!(opened.server_id, "g1");

    session.close_blocking().await;
    assert!(!session.voice().is_connected());
    Ok(())
}

#[tokio::test]
async fn test_update_status_is_sent_immediately() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, _cache) = test_session(test_config(&gateway.url(), false))?;
    session.connect_blocking_in_background();

    let mut conn = gateway.next_connection().await?;
    conn.handshake("s1", 40_000).await?;
    wait_for_state(&session, SessionState::Ready).await?;
    conn.recv_op(3).await?;

    session.update_status(Some("chess".to_string()), true)?;
    let status = conn.recv_op(3).await?;
    assert_eq!(status["d"]["game"]["name"], "chess");
    assert_eq!(status["d"]["idle_since"], 1);

    session.close_blocking().await;
    Ok(())
}

#[tokio::test]
async fn test_owner_close_sends_close_frame() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, _cache) = test_session(test_config(&gateway.url(), true))?;
    session.connect_blocking_in_background();

    let mut conn = gateway.next_connection().await?;
    conn.handshake("s1", 40_000).await?;
    wait_for_state(&session, SessionState::Ready).await?;

    session.close_blocking().await;
    assert_eq!(conn.recv_close().await?, Some(1000));
    assert_eq!(session.state(), SessionState::Disconnected);
    // Owner closes never reconnect
    gateway.expect_no_connection(Duration::from_millis(300)).await?;
    Ok(())
}

#[tokio::test]
async fn test_close_mid_handshake() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let (session, _cache) = test_session(test_config(&gateway.url(), true))?;
    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect_blocking().await })
    };

    let mut conn = gateway.next_connection().await?;
    conn.recv_op(2).await?;
    session.close_blocking().await;

    assert!(connecting.await?.is_err());
    assert_eq!(session.state(), SessionState::Disconnected);
    Ok(())
}

// ============================================================================
// REST
// ============================================================================

#[tokio::test]
async fn test_gateway_url_discovered_over_rest() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let api = serve_http(200, json!({"url": gateway.url()})).await?;

    let mut config = test_config(&gateway.url(), false);
    config.gateway.url = None;
    config.rest.api_base_url = format!("http://{api}");
    let (session, _cache) = test_session(config)?;
    session.connect_blocking_in_background();

    let mut conn = gateway.next_connection().await?;
    conn.handshake("s1", 40_000).await?;
    wait_for_state(&session, SessionState::Ready).await?;

    session.close_blocking().await;
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_gateway_lookup_fails_connect() -> Result<()> {
    let api = serve_http(401, json!({"message": "401: Unauthorized"})).await?;

    let mut config = test_config("ws://unused", false);
    config.gateway.url = None;
    config.rest.api_base_url = format!("http://{api}");
    let (session, _cache) = test_session(config)?;

    let result = session.connect_blocking().await;
    assert!(
        matches!(result, Err(GatewayError::Rest(RestError::Unauthorized))),
        "{result:?}"
    );
    Ok(())
}

#[tokio::test]
async fn test_typing_by_unknown_user_is_resolved_over_rest() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let api = serve_http(200, json!({"id": "u7", "username": "typist"})).await?;

    let mut config = test_config(&gateway.url(), false);
    config.rest.api_base_url = format!("http://{api}");
    let (session, cache) = test_session(config)?;
    let recorder = EventRecorder::attach(&session);
    session.connect_blocking_in_background();

    let mut conn = gateway.next_connection().await?;
    conn.handshake("s1", 40_000).await?;
    conn.send_dispatch("TYPING_START", 2, json!({"channel_id": "c1", "user_id": "u7"}))
        .await?;

    match recorder.wait_for(&session, "TYPING_STARTED").await? {
        ClientEvent::TypingStarted(e) => assert_eq!(e.user_id, "u7"),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(cache.get(EntityKind::User, "u7").unwrap()["username"], "typist");

    session.close_blocking().await;
    Ok(())
}

/// Start connecting without waiting for the result
trait ConnectInBackground {
    fn connect_blocking_in_background(&self);
}

impl ConnectInBackground for chat_gateway::GatewaySession {
    fn connect_blocking_in_background(&self) {
        self.connect(|_| {}).expect("connect");
    }
}
