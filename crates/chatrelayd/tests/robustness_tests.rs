//! Robustness tests for the chat relay server.
//!
//! These tests verify the server handles edge cases and error conditions gracefully:
//! - Malformed frames
//! - Frame size limits
//! - Rapid connect/disconnect
//! - Clients that vanish mid-conversation
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::net::SocketAddr;
use std::time::Duration;

use chatrelay_core::StreamId;
use chatrelay_protocol::{ClientEvent, ServerEvent};
use chatrelayd::config::ServerConfig;
use chatrelayd::registry::{spawn_registry, RegistryHandle};
use chatrelayd::server::ChatServer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn() -> Self {
        let registry = spawn_registry();
        let cancel_token = CancellationToken::new();
        let config = ServerConfig::default().with_listen_addr("127.0.0.1:0");

        let server = ChatServer::bind(config, registry.clone(), cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr().expect("local addr");

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        TestServer {
            addr,
            registry,
            cancel_token,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    /// Polls until the room reaches `expected` members.
    async fn wait_for_viewers(&self, stream_id: &str, expected: usize) {
        let start = tokio::time::Instant::now();
        loop {
            let viewers = self
                .registry
                .count(StreamId::new(stream_id))
                .await
                .expect("registry running");
            if viewers == expected {
                return;
            }
            assert!(
                start.elapsed() < SETTLE_TIMEOUT,
                "room {stream_id} stuck at {viewers} viewers, expected {expected}"
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    fn shutdown(self) {
        self.cancel_token.cancel();
    }
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, event: ClientEvent) {
        let json = serde_json::to_string(&event).unwrap();
        self.send_raw(json.as_bytes()).await;
        self.send_raw(b"\n").await;
    }

    async fn send_raw(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> ServerEvent {
        let mut line = String::new();
        timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("frame within timeout")
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn handshake(&mut self, stream_id: &str) {
        self.send(ClientEvent::connect(Some(stream_id))).await;
        match self.recv().await {
            ServerEvent::Connected { .. } => {}
            other => panic!("Expected Connected, got {other:?}"),
        }
        match self.recv().await {
            ServerEvent::ViewerCount(_) => {}
            other => panic!("Expected ViewerCount, got {other:?}"),
        }
    }

    /// Returns true once the server has closed the connection.
    async fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        loop {
            line.clear();
            match timeout(RECV_TIMEOUT, self.reader.read_line(&mut line)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }
}

// ============================================================================
// Malformed Frame Tests
// ============================================================================

#[tokio::test]
async fn test_malformed_json_ignored() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake("abc").await;

    client.send_raw(b"this is not valid json\n").await;
    client.send_raw(b"{\"event\":\"/kick\",\"data\":\"bob\"}\n").await;
    client.send_raw(b"{\"no_event\":true}\n").await;

    // Connection is still usable
    client.send(ClientEvent::Ping { seq: 7 }).await;
    assert_eq!(client.recv().await, ServerEvent::Pong { seq: 7 });

    server.shutdown();
}

#[tokio::test]
async fn test_invalid_utf8_frame_ignored() {
    let server = TestServer::spawn().await;
    let mut sender = server.connect().await;
    sender.handshake("abc").await;
    let mut other = server.connect().await;
    other.handshake("abc").await;
    assert_eq!(sender.recv().await, ServerEvent::ViewerCount(2));

    sender
        .send_raw(b"{\"event\":\"new message\",\"data\":\"\xff\xfe\"}\n")
        .await;
    sender.send(ClientEvent::Ping { seq: 1 }).await;

    assert_eq!(sender.recv().await, ServerEvent::Pong { seq: 1 });
    server.wait_for_viewers("abc", 2).await;

    // The other member saw no departure.
    other.send(ClientEvent::Ping { seq: 2 }).await;
    assert_eq!(other.recv().await, ServerEvent::Pong { seq: 2 });

    server.shutdown();
}

#[tokio::test]
async fn test_empty_lines_ignored() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake("abc").await;

    client.send_raw(b"\n\n   \n").await;

    client.send(ClientEvent::Ping { seq: 1 }).await;
    assert_eq!(client.recv().await, ServerEvent::Pong { seq: 1 });

    server.shutdown();
}

#[tokio::test]
async fn test_malformed_handshake_rejected() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send_raw(b"{\"protocol_version\"\n").await;

    assert!(matches!(client.recv().await, ServerEvent::Rejected { .. }));
    assert!(client.is_closed().await);

    // Server should still accept connections
    let mut client2 = server.connect().await;
    client2.handshake("abc").await;

    server.shutdown();
}

#[tokio::test]
async fn test_repeated_connect_ignored() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake("abc").await;

    client.send(ClientEvent::connect(Some("xyz"))).await;
    client.send(ClientEvent::Ping { seq: 2 }).await;

    assert_eq!(client.recv().await, ServerEvent::Pong { seq: 2 });
    server.wait_for_viewers("abc", 1).await;
    server.wait_for_viewers("xyz", 0).await;

    server.shutdown();
}

// ============================================================================
// Size Limit Tests
// ============================================================================

#[tokio::test]
async fn test_oversized_frame_disconnects() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake("abc").await;

    let huge = format!(
        "{{\"event\":\"new message\",\"data\":\"{}\"}}\n",
        "x".repeat(128 * 1024)
    );
    // The server may reset the connection before the write completes
    let _ = client.writer.write_all(huge.as_bytes()).await;

    assert!(client.is_closed().await);
    server.wait_for_viewers("abc", 0).await;

    server.shutdown();
}

#[tokio::test]
async fn test_frame_just_under_limit_accepted() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake("abc").await;

    client.send(ClientEvent::sign_in("u1", "alice")).await;
    assert_eq!(client.recv().await, ServerEvent::SignedIn);

    let text = "y".repeat(60 * 1024);
    client.send(ClientEvent::new_message(text.clone())).await;

    match client.recv().await {
        ServerEvent::NewMessage(message) => assert_eq!(message.text(), text),
        other => panic!("Expected NewMessage, got {other:?}"),
    }
    assert_eq!(client.recv().await, ServerEvent::MessageReceived);

    server.shutdown();
}

// ============================================================================
// Connection Churn Tests
// ============================================================================

#[tokio::test]
async fn test_rapid_connect_disconnect() {
    let server = TestServer::spawn().await;

    for _ in 0..20 {
        let mut client = server.connect().await;
        client.handshake("churn").await;
        drop(client);
    }

    server.wait_for_viewers("churn", 0).await;

    let mut client = server.connect().await;
    client.send(ClientEvent::connect(Some("churn"))).await;
    assert!(matches!(client.recv().await, ServerEvent::Connected { .. }));
    assert_eq!(client.recv().await, ServerEvent::ViewerCount(1));

    server.shutdown();
}

#[tokio::test]
async fn test_connect_without_handshake_then_drop() {
    let server = TestServer::spawn().await;

    for _ in 0..10 {
        let client = server.connect().await;
        drop(client);
    }

    let mut client = server.connect().await;
    client.handshake("abc").await;
    server.wait_for_viewers("abc", 1).await;

    server.shutdown();
}

#[tokio::test]
async fn test_silent_member_does_not_stall_room() {
    let server = TestServer::spawn().await;

    // Joins but never reads its socket
    let mut lurker = server.connect().await;
    lurker.handshake("abc").await;

    let mut talker = server.connect().await;
    talker.handshake("abc").await;
    talker.send(ClientEvent::sign_in("u1", "alice")).await;
    assert_eq!(talker.recv().await, ServerEvent::SignedIn);

    for i in 0..50 {
        talker.send(ClientEvent::new_message(format!("msg {i}"))).await;
        assert!(matches!(talker.recv().await, ServerEvent::NewMessage(_)));
        assert_eq!(talker.recv().await, ServerEvent::MessageReceived);
    }

    server.shutdown();
}
