//! End-to-end tests over loopback sockets
//!
//! Each test starts its own server on an OS-assigned port and drives it with
//! the real clients or with raw sockets.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scriptsocket_core::framing::encode;
use scriptsocket_core::{
    connect_and_send, BindError, ClientConfig, ClientError, LogKind, MemoryLogSink, Message,
    SendClient, Server, ServerConfig, ServerState, StagingStore, StaticContent, TestClient,
    TEST_MARKER,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;

// ----------------------------------------------------------------------------
// Test Setup
// ----------------------------------------------------------------------------

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    server: Server,
    log: Arc<MemoryLogSink>,
    port: u16,
    _dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let staging = Arc::new(StagingStore::new(dir.path().join("staging")).unwrap());
        let log = Arc::new(MemoryLogSink::new());
        let server = Server::new(
            ServerConfig::default()
                .with_bind_host("127.0.0.1")
                .with_flush_timeout(Duration::from_millis(200)),
            staging,
            log.clone(),
        );

        let handle = server.start(0).await.expect("Failed to start server");
        Self {
            server,
            log,
            port: handle.port(),
            _dir: dir,
        }
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.port).with_timeout(TEST_TIMEOUT)
    }

    fn staged(&self) -> Option<Vec<u8>> {
        fs::read(self.server.staging().path()).ok()
    }

    async fn connect_raw(&self) -> TcpStream {
        TcpStream::connect(("127.0.0.1", self.port))
            .await
            .expect("Failed to connect")
    }
}

/// Wait until the published state satisfies `pred`
async fn wait_for_state(
    rx: &mut watch::Receiver<ServerState>,
    pred: impl Fn(&ServerState) -> bool,
) -> ServerState {
    timeout(TEST_TIMEOUT, async {
        loop {
            let current = rx.borrow_and_update().clone();
            if pred(&current) {
                return current;
            }
            rx.changed().await.expect("Server state channel closed");
        }
    })
    .await
    .expect("Timed out waiting for server state")
}

fn connected_to(peer: SocketAddr) -> impl Fn(&ServerState) -> bool {
    move |state| matches!(state, ServerState::Connected { peer: p, .. } if *p == peer)
}

fn is_listening(state: &ServerState) -> bool {
    matches!(state, ServerState::Listening { .. })
}

/// Read a single frame body from a raw stream
async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
    stream.read_exact(&mut body).await.unwrap();
    body
}

fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_test_client_is_acknowledged_without_staging() {
    let harness = Harness::start().await;

    let client = TestClient::new(
        ClientConfig::new("localhost", harness.port).with_timeout(TEST_TIMEOUT),
    );
    let ack = client.send().await.expect("Test message was not acknowledged");

    assert_eq!(ack.message(), Some(Message::Ack));
    assert!(ack.round_trip < TEST_TIMEOUT);
    assert_eq!(harness.server.staging().generation(), 0);
    assert!(harness.staged().is_none());
    assert_eq!(harness.log.lines_of(LogKind::Received).len(), 1);

    harness.server.stop().await;
}

#[tokio::test]
async fn test_send_client_stages_exact_payload() {
    let harness = Harness::start().await;

    let client = SendClient::new(harness.client_config());
    let ack = client
        .send(Arc::new(StaticContent::new("Blur { size 2 }")))
        .await
        .expect("Content was not acknowledged");

    assert_eq!(ack.message(), Some(Message::Ack));
    assert_eq!(harness.staged().unwrap(), b"Blur { size 2 }");
    assert_eq!(harness.server.staging().generation(), 1);
    let received = harness.log.lines_of(LogKind::Received);
    assert_eq!(received.len(), 1);
    assert!(received[0].starts_with("Content from 127.0.0.1:"));
    assert!(received[0].ends_with("(15 bytes)"));

    let staged_path = harness.server.staging().path().display().to_string();
    let output = harness.log.lines_of(LogKind::Output);
    assert_eq!(output, vec![format!("Staged 15 bytes at {}", staged_path)]);

    harness.server.stop().await;
}

#[tokio::test]
async fn test_each_receipt_overwrites_staged_payload() {
    let harness = Harness::start().await;
    let client = SendClient::new(harness.client_config());

    client
        .send_text("Grade { white 1.2 }\nBlur { size 40 }".to_string())
        .await
        .unwrap();
    client.send_text("Dot {}".to_string()).await.unwrap();

    assert_eq!(harness.staged().unwrap(), b"Dot {}");
    assert_eq!(harness.server.staging().generation(), 2);

    harness.server.stop().await;
}

#[tokio::test]
async fn test_content_equal_to_test_marker_is_staged() {
    let harness = Harness::start().await;

    SendClient::new(harness.client_config())
        .send_text(TEST_MARKER.to_string())
        .await
        .unwrap();

    assert_eq!(harness.staged().unwrap(), TEST_MARKER.as_bytes());

    harness.server.stop().await;
}

#[tokio::test]
async fn test_empty_payload_is_rejected_without_connecting() {
    let harness = Harness::start().await;
    let mut states = harness.server.subscribe();
    states.borrow_and_update();

    let result = SendClient::new(harness.client_config())
        .send(Arc::new(StaticContent::new("")))
        .await;

    assert!(matches!(result, Err(ClientError::EmptyPayload)));
    assert!(!states.has_changed().unwrap());
    assert!(harness.log.lines_of(LogKind::Received).is_empty());

    harness.server.stop().await;
}

#[tokio::test]
async fn test_port_in_use_is_reported_without_side_effects() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(
        ServerConfig::default().with_bind_host("127.0.0.1"),
        Arc::new(StagingStore::new(dir.path()).unwrap()),
        Arc::new(MemoryLogSink::new()),
    );

    match server.start(port as i64).await {
        Err(BindError::PortInUse { port: reported }) => assert_eq!(reported, port),
        other => panic!("expected PortInUse, got {:?}", other),
    }
    assert_eq!(server.state(), ServerState::Stopped);

    // The failed attempt left nothing behind: the server can start elsewhere.
    let handle = server.start(0).await.unwrap();
    assert_ne!(handle.port(), port);
    server.stop().await;
}

#[tokio::test]
async fn test_second_server_on_same_port_leaves_first_running() {
    let first = Harness::start().await;

    let dir = tempfile::tempdir().unwrap();
    let second = Server::new(
        ServerConfig::default().with_bind_host("127.0.0.1"),
        Arc::new(StagingStore::new(dir.path()).unwrap()),
        Arc::new(MemoryLogSink::new()),
    );
    assert!(matches!(
        second.start(first.port as i64).await,
        Err(BindError::PortInUse { .. })
    ));

    TestClient::new(first.client_config())
        .send()
        .await
        .expect("First listener stopped working");

    first.server.stop().await;
}

#[tokio::test]
async fn test_refused_connection_is_reported_promptly() {
    let port = unused_port();
    let started = Instant::now();

    let result = TestClient::new(ClientConfig::new("127.0.0.1", port).with_timeout(TEST_TIMEOUT))
        .send()
        .await;

    assert!(matches!(result, Err(ClientError::ConnectionRefused { .. })));
    assert!(started.elapsed() < TEST_TIMEOUT);
}

// ----------------------------------------------------------------------------
// Lifecycle and Session Policy
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_stop_is_idempotent() {
    let harness = Harness::start().await;

    harness.server.stop().await;
    harness.server.stop().await;
    assert_eq!(harness.server.state(), ServerState::Stopped);

    let result = TestClient::new(harness.client_config()).send().await;
    assert!(matches!(result, Err(ClientError::ConnectionRefused { .. })));
}

#[tokio::test]
async fn test_server_restarts_after_stop() {
    let harness = Harness::start().await;
    harness.server.stop().await;

    let handle = harness.server.start(0).await.unwrap();
    TestClient::new(ClientConfig::new("127.0.0.1", handle.port()).with_timeout(TEST_TIMEOUT))
        .send()
        .await
        .unwrap();

    harness.server.stop().await;
}

#[tokio::test]
async fn test_new_peer_supersedes_active_session() {
    let harness = Harness::start().await;
    let mut states = harness.server.subscribe();

    let mut first = harness.connect_raw().await;
    wait_for_state(&mut states, connected_to(first.local_addr().unwrap())).await;

    let mut second = harness.connect_raw().await;
    let second_addr = second.local_addr().unwrap();
    wait_for_state(&mut states, connected_to(second_addr)).await;

    // The first peer sees its connection end.
    let mut buf = [0u8; 16];
    let read = timeout(TEST_TIMEOUT, first.read(&mut buf))
        .await
        .expect("First session was not closed");
    assert!(matches!(read, Ok(0) | Err(_)));

    assert_eq!(harness.server.active_peer().await, Some(second_addr));

    // The surviving session still works.
    second
        .write_all(&encode(&Message::Test.to_bytes()).unwrap())
        .await
        .unwrap();
    let reply = timeout(TEST_TIMEOUT, read_frame(&mut second)).await.unwrap();
    assert_eq!(Message::from_bytes(&reply).unwrap(), Message::Ack);

    assert!(harness
        .log
        .lines_of(LogKind::Status)
        .iter()
        .any(|line| line.contains("replaces")));

    harness.server.stop().await;
}

#[tokio::test]
async fn test_peer_disconnect_returns_to_listening() {
    let harness = Harness::start().await;
    let mut states = harness.server.subscribe();

    let peer = harness.connect_raw().await;
    wait_for_state(&mut states, connected_to(peer.local_addr().unwrap())).await;

    drop(peer);
    wait_for_state(&mut states, is_listening).await;
    assert_eq!(harness.server.active_peer().await, None);
    assert!(harness.server.state().is_up());

    TestClient::new(harness.client_config())
        .send()
        .await
        .expect("Server stopped listening after disconnect");

    harness.server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_active_session() {
    let harness = Harness::start().await;
    let mut states = harness.server.subscribe();

    let mut peer = harness.connect_raw().await;
    wait_for_state(&mut states, connected_to(peer.local_addr().unwrap())).await;

    harness.server.stop().await;
    assert_eq!(harness.server.state(), ServerState::Stopped);
    assert_eq!(harness.server.active_peer().await, None);

    let mut buf = [0u8; 16];
    let read = timeout(TEST_TIMEOUT, peer.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_malformed_message_is_logged_and_session_survives() {
    let harness = Harness::start().await;
    let mut peer = harness.connect_raw().await;

    peer.write_all(&encode(&[0x7f, b'?']).unwrap()).await.unwrap();
    peer.write_all(&encode(&Message::Test.to_bytes()).unwrap())
        .await
        .unwrap();

    let reply = timeout(TEST_TIMEOUT, read_frame(&mut peer)).await.unwrap();
    assert_eq!(Message::from_bytes(&reply).unwrap(), Message::Ack);
    assert_eq!(harness.log.lines_of(LogKind::Error).len(), 1);

    harness.server.stop().await;
}

#[tokio::test]
async fn test_oversized_frame_closes_session_only() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(
        ServerConfig::default()
            .with_bind_host("127.0.0.1")
            .with_max_frame_len(1024),
        Arc::new(StagingStore::new(dir.path()).unwrap()),
        Arc::new(MemoryLogSink::new()),
    );
    let port = server.start(0).await.unwrap().port();
    let mut states = server.subscribe();

    let mut peer = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    peer.write_all(&[0xff, 0xff, 0xff, 0xff]).await.unwrap();

    let mut buf = [0u8; 16];
    let read = timeout(TEST_TIMEOUT, peer.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    wait_for_state(&mut states, is_listening).await;
    TestClient::new(ClientConfig::new("127.0.0.1", port).with_timeout(TEST_TIMEOUT))
        .send()
        .await
        .unwrap();

    server.stop().await;
}

// ----------------------------------------------------------------------------
// Staging Failures and Cancellation
// ----------------------------------------------------------------------------

/// A harness whose staged file location is occupied by a directory, so every
/// staging write fails
async fn broken_staging_harness() -> Harness {
    let harness = Harness::start().await;
    fs::create_dir_all(harness.server.staging().path()).unwrap();
    harness
}

#[tokio::test]
async fn test_staging_failure_withholds_acknowledgment() {
    let harness = broken_staging_harness().await;

    let result = connect_and_send(
        "127.0.0.1",
        harness.port,
        &Message::content("Blur { size 2 }"),
        Duration::from_millis(300),
    )
    .await;

    assert!(matches!(result, Err(ClientError::ConnectionTimeout { .. })));
    assert_eq!(harness.server.staging().generation(), 0);
    assert_eq!(harness.log.lines_of(LogKind::Error).len(), 1);

    harness.server.stop().await;
}

#[tokio::test]
async fn test_stop_resolves_pending_acknowledgment_wait() {
    let harness = broken_staging_harness().await;
    let mut states = harness.server.subscribe();
    let port = harness.port;

    let started = Instant::now();
    let pending = tokio::spawn(async move {
        connect_and_send(
            "127.0.0.1",
            port,
            &Message::content("Blur { size 2 }"),
            Duration::from_secs(30),
        )
        .await
    });

    wait_for_state(&mut states, |s| matches!(s, ServerState::Connected { .. })).await;
    timeout(TEST_TIMEOUT, async {
        while harness.log.lines_of(LogKind::Error).is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Staging failure was not logged");

    harness.server.stop().await;

    let result = timeout(TEST_TIMEOUT, pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(ClientError::ConnectionClosed { .. })));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn test_observer_sees_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::new(
        ServerConfig::default().with_bind_host("127.0.0.1"),
        Arc::new(StagingStore::new(dir.path()).unwrap()),
        Arc::new(MemoryLogSink::new()),
    );
    let mut states = server.subscribe();
    assert_eq!(*states.borrow_and_update(), ServerState::Stopped);

    let handle = server.start(0).await.unwrap();
    let listening = wait_for_state(&mut states, is_listening).await;
    assert_eq!(
        listening,
        ServerState::Listening {
            addr: handle.local_addr()
        }
    );

    let peer = TcpStream::connect(handle.local_addr()).await.unwrap();
    let connected = wait_for_state(&mut states, connected_to(peer.local_addr().unwrap())).await;
    assert!(connected.is_up());

    server.stop().await;
    wait_for_state(&mut states, |s| *s == ServerState::Stopped).await;
}
