// Integration tests for the relay server
// Each test binds a real server on an ephemeral loopback port and drives it
// with plain TCP clients speaking the terminated-frame protocol.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use rusty_relay::config::ServerConfig;
use rusty_relay::constants::{
    DEFAULT_ACK_MESSAGE, RATE_LIMITED_NOTICE, SERVER_FULL_NOTICE, SHUTDOWN_NOTICE,
};
use rusty_relay::core::{encode_frame, FrameReader, RelayServer, SessionOutcome, SharedRegistry};
use rusty_relay::error::Result;

const STEP_TIMEOUT: Duration = Duration::from_secs(3);

// Running server plus the operator end of its control channel
struct TestServer {
    addr: SocketAddr,
    registry: SharedRegistry,
    operator: DuplexStream,
    handle: JoinHandle<Result<Vec<SessionOutcome>>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let server = RelayServer::bind(config).await.expect("Failed to bind test server");
        let addr = server.local_addr();
        let registry = server.registry();
        let (operator, control) = tokio::io::duplex(256);
        let handle = tokio::spawn(server.run(BufReader::new(control)));

        Self {
            addr,
            registry,
            operator,
            handle,
        }
    }

    async fn wait_for_clients(&self, expected: usize) {
        tokio::time::timeout(STEP_TIMEOUT, async {
            while self.registry.client_count().unwrap() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("registry never reached {} clients", expected));
    }

    async fn operator_says(&mut self, line: &str) {
        self.operator
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn finish(self) -> Vec<SessionOutcome> {
        tokio::time::timeout(STEP_TIMEOUT, self.handle)
            .await
            .expect("server did not stop in time")
            .unwrap()
            .expect("server returned an error")
    }
}

struct TestClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FrameReader::new(read_half, 1024),
            writer: write_half,
        }
    }

    async fn send(&mut self, text: &str) {
        self.writer.write_all(&encode_frame(text)).await.unwrap();
    }

    async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(STEP_TIMEOUT, self.reader.next_message())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .map(|m| m.content)
    }

    async fn expect(&mut self, text: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(text));
    }

    // Nothing arrives within a short window
    async fn expect_silence(&mut self) {
        let result =
            tokio::time::timeout(Duration::from_millis(200), self.reader.next_message()).await;
        assert!(result.is_err(), "unexpected frame: {:?}", result);
    }
}

#[tokio::test]
async fn test_capacity_rejection() {
    let mut config = ServerConfig::for_testing();
    config.max_clients = 2;
    let mut server = TestServer::start(config).await;

    let _c1 = TestClient::connect(server.addr).await;
    let _c2 = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    let mut c3 = TestClient::connect(server.addr).await;
    c3.expect(SERVER_FULL_NOTICE).await;
    assert_eq!(c3.recv().await, None);
    assert_eq!(server.registry.client_count().unwrap(), 2);

    server.operator_says("quit").await;
    server.finish().await;
}

#[tokio::test]
async fn test_freed_slot_admits_next_client() {
    let mut config = ServerConfig::for_testing();
    config.max_clients = 1;
    let mut server = TestServer::start(config).await;

    let c1 = TestClient::connect(server.addr).await;
    server.wait_for_clients(1).await;
    drop(c1);
    server.wait_for_clients(0).await;

    let mut c2 = TestClient::connect(server.addr).await;
    server.wait_for_clients(1).await;
    c2.send("hello").await;
    c2.expect(DEFAULT_ACK_MESSAGE).await;

    server.operator_says("quit").await;
    server.finish().await;
}

#[tokio::test]
async fn test_rate_limited_message_is_not_relayed() {
    let mut config = ServerConfig::for_testing();
    config.rate_limit_cooldown = Duration::from_millis(500);
    let mut server = TestServer::start(config).await;

    let mut c1 = TestClient::connect(server.addr).await;
    let mut c2 = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    c1.send("hello").await;
    c2.expect("hello").await;
    c1.expect(DEFAULT_ACK_MESSAGE).await;

    c1.send("world").await;
    c1.expect(RATE_LIMITED_NOTICE).await;
    c2.expect_silence().await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    c1.send("again").await;
    c2.expect("again").await;
    c1.expect(DEFAULT_ACK_MESSAGE).await;

    server.operator_says("quit").await;
    server.finish().await;
}

#[tokio::test]
async fn test_quit_ends_only_the_sender() {
    let mut server = TestServer::start(ServerConfig::for_testing()).await;

    let mut c1 = TestClient::connect(server.addr).await;
    let mut c2 = TestClient::connect(server.addr).await;
    let mut c3 = TestClient::connect(server.addr).await;
    server.wait_for_clients(3).await;

    c1.send("quit").await;
    c2.expect("quit").await;
    c3.expect("quit").await;
    assert_eq!(c1.recv().await, None);
    server.wait_for_clients(2).await;

    // Remaining clients keep talking
    c2.send("still here").await;
    c3.expect("still here").await;
    c2.expect(DEFAULT_ACK_MESSAGE).await;

    server.operator_says("quit").await;
    let outcomes = server.finish().await;
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.contains(&SessionOutcome::Sentinel));
}

#[tokio::test]
async fn test_operator_shutdown_notifies_and_disconnects() {
    let mut server = TestServer::start(ServerConfig::for_testing()).await;

    let mut c1 = TestClient::connect(server.addr).await;
    let mut c2 = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    // Unknown commands are ignored
    server.operator_says("status").await;
    c1.expect_silence().await;

    server.operator_says("quit").await;
    for client in [&mut c1, &mut c2] {
        client.expect(SHUTDOWN_NOTICE).await;
        assert_eq!(client.recv().await, None);
    }

    let addr = server.addr;
    let outcomes = server.finish().await;
    assert_eq!(outcomes.len(), 2);

    // Listener is gone
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_closed_control_input_stops_server() {
    let server = TestServer::start(ServerConfig::for_testing()).await;
    let mut c1 = TestClient::connect(server.addr).await;
    server.wait_for_clients(1).await;

    let TestServer {
        operator, handle, ..
    } = server;
    drop(operator);

    c1.expect(SHUTDOWN_NOTICE).await;
    let outcomes = tokio::time::timeout(STEP_TIMEOUT, handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcomes.len(), 1);
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let first = RelayServer::bind(ServerConfig::for_testing()).await.unwrap();
    let mut config = ServerConfig::for_testing();
    config.port = first.local_addr().port();

    let err = RelayServer::bind(config).await.err().expect("second bind should fail");
    assert!(err.to_string().contains("listening endpoint"));
}
