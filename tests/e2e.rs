//! E2E tests for the MJPEG server over real TCP sockets
//!
//! Run: `cargo test --test e2e`
//!
//! Every server binds 127.0.0.1 on an OS-assigned port with a short accept
//! timeout so lifecycle changes are observed quickly.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use mjpeg_serve::protocol::{constants::DEFAULT_BOUNDARY, stream_header};
use mjpeg_serve::{MjpegServer, OriginPolicy, ServerConfig, ServerState};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn local_config() -> ServerConfig {
    ServerConfig::default()
        .bind_ip("127.0.0.1".parse().unwrap())
        .port(0)
        .accept_timeout(Duration::from_millis(50))
        .write_timeout(Duration::from_secs(2))
}

async fn started(config: ServerConfig) -> (MjpegServer, SocketAddr) {
    init_tracing();
    let server = MjpegServer::new(config);
    server.start().await.unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
}

/// A port nothing listens on right now
fn free_port() -> u16 {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(IO_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

struct Client {
    reader: BufReader<TcpStream>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            reader: BufReader::new(stream),
        }
    }

    async fn read_header(&mut self) {
        let expected = stream_header(DEFAULT_BOUNDARY);
        let mut header = vec![0u8; expected.len()];
        timeout(IO_TIMEOUT, self.reader.read_exact(&mut header))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Bytes::from(header), expected);
    }

    /// Next part body, `None` once the server closed the stream
    async fn read_part(&mut self) -> Option<Vec<u8>> {
        timeout(IO_TIMEOUT, async {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await.ok()? == 0 {
                return None;
            }
            assert_eq!(line, "Content-type: image/jpeg\r\n");

            line.clear();
            self.reader.read_line(&mut line).await.ok()?;
            let len: usize = line
                .strip_prefix("Content-Length: ")?
                .trim_end()
                .parse()
                .ok()?;

            line.clear();
            self.reader.read_line(&mut line).await.ok()?;
            assert_eq!(line, "\r\n");

            let mut body = vec![0u8; len];
            self.reader.read_exact(&mut body).await.ok()?;

            let mut trailer = vec![0u8; DEFAULT_BOUNDARY.len() + 6];
            self.reader.read_exact(&mut trailer).await.ok()?;
            assert_eq!(trailer, b"\r\n--CameraServeDataBoundary\r\n");

            Some(body)
        })
        .await
        .unwrap()
    }

    /// Drain until the server closes, returning how many bytes arrived
    async fn read_to_close(&mut self) -> usize {
        let mut rest = Vec::new();
        // A reset counts as closed too
        let _ = timeout(IO_TIMEOUT, self.reader.read_to_end(&mut rest))
            .await
            .unwrap();
        rest.len()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn streams_latest_frame_to_client() {
    let (server, addr) = started(local_config()).await;
    let store = server.frame_store().clone();
    store.publish(Bytes::from_static(b"AAAAA"));

    let mut client = Client::connect(addr).await;
    client.read_header().await;
    assert_eq!(client.read_part().await.unwrap(), b"AAAAA");

    store.publish(Bytes::from_static(b"BB"));

    let mut switched = false;
    for _ in 0..100_000 {
        let body = client.read_part().await.unwrap();
        if body == b"BB" {
            switched = true;
            break;
        }
        assert_eq!(body, b"AAAAA");
    }
    assert!(switched);
    assert_eq!(client.read_part().await.unwrap(), b"BB");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_frame_before_first_publish() {
    let (server, addr) = started(local_config()).await;

    let mut client = Client::connect(addr).await;
    client.read_header().await;
    assert!(client.read_part().await.unwrap().is_empty());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn several_clients_share_the_store() {
    let (server, addr) = started(local_config()).await;
    server.frame_store().publish(vec![0x42; 1024]);

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut client = Client::connect(addr).await;
        client.read_header().await;
        clients.push(client);
    }
    for client in &mut clients {
        assert_eq!(client.read_part().await.unwrap(), vec![0x42; 1024]);
    }

    wait_until(|| server.stats().active_connections == 3).await;
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_origin_gets_no_bytes() {
    // Loopback is not site-local, so the strict policy refuses the test client
    let (server, addr) = started(local_config().origin_policy(OriginPolicy::SiteLocal)).await;
    server.frame_store().publish(Bytes::from_static(b"secret"));

    let mut client = Client::connect(addr).await;
    assert_eq!(client.read_to_close().await, 0);

    let stats = server.stats();
    assert_eq!(stats.rejected_connections, 1);
    assert_eq!(stats.total_connections, 0);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_limit_closes_excess_clients() {
    let (server, addr) = started(local_config().max_connections(1)).await;

    let mut first = Client::connect(addr).await;
    first.read_header().await;

    let mut second = Client::connect(addr).await;
    assert_eq!(second.read_to_close().await, 0);
    assert!(first.read_part().await.is_some());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn pause_closes_clients_and_socket() {
    let (server, addr) = started(local_config()).await;
    server.frame_store().publish(vec![0xD8; 2048]);

    let mut client = Client::connect(addr).await;
    client.read_header().await;
    assert!(client.read_part().await.is_some());

    server.pause().await;
    assert_eq!(server.state(), ServerState::Paused);

    // Whatever was in flight arrives as whole parts, then the stream ends
    while let Some(body) = client.read_part().await {
        assert_eq!(body.len(), 2048);
    }

    wait_until(|| server.local_addr().is_none()).await;
    wait_until(|| server.stats().active_connections == 0).await;
    assert!(TcpStream::connect(addr).await.is_err());

    server.resume().await.unwrap();
    assert_eq!(server.state(), ServerState::Running);
    wait_until(|| server.local_addr().is_some()).await;

    let mut client = Client::connect(server.local_addr().unwrap()).await;
    client.read_header().await;

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn port_change_rebinds_listener() {
    let (server, old_addr) = started(local_config()).await;

    let new_port = free_port();
    server.set_port(new_port);
    wait_until(|| server.local_addr().map(|a| a.port()) == Some(new_port)).await;

    let mut client = Client::connect(server.local_addr().unwrap()).await;
    client.read_header().await;
    assert!(TcpStream::connect(old_addr).await.is_err());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_rebind_keeps_old_socket() {
    let config = local_config().max_rebind_backoff(Duration::from_millis(200));
    let (server, addr) = started(config).await;

    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let busy_port = occupied.local_addr().unwrap().port();
    server.set_port(busy_port);

    wait_until(|| server.health().rebind_failures >= 1).await;
    let health = server.health();
    assert_eq!(health.bound_addr, Some(addr));
    assert!(health.last_error.is_some());

    let mut client = Client::connect(addr).await;
    client.read_header().await;

    // Once the port frees up the next retry succeeds
    drop(occupied);
    wait_until(|| server.local_addr().map(|a| a.port()) == Some(busy_port)).await;
    assert_eq!(server.health().rebind_failures, 0);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn new_port_ignores_backoff_from_earlier_failures() {
    // Default 60 s backoff cap: waiting it out would blow the IO timeout
    let (server, addr) = started(local_config()).await;

    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    server.set_port(occupied.local_addr().unwrap().port());
    wait_until(|| server.health().rebind_failures >= 6).await;

    // Back to the bound port clears the error
    server.set_port(addr.port());
    wait_until(|| server.health().rebind_failures == 0).await;
    let health = server.health();
    assert_eq!(health.bound_addr, Some(addr));
    assert!(health.last_error.is_none());

    let new_port = free_port();
    let started_at = tokio::time::Instant::now();
    server.set_port(new_port);
    wait_until(|| server.local_addr().map(|a| a.port()) == Some(new_port)).await;
    assert!(
        started_at.elapsed() < Duration::from_millis(500),
        "rebind took {:?}",
        started_at.elapsed()
    );

    let mut client = Client::connect(server.local_addr().unwrap()).await;
    client.read_header().await;

    drop(occupied);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_releases_port() {
    let (server, addr) = started(local_config()).await;

    server.stop().await;
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(server.local_addr().is_none());
    assert!(TcpStream::connect(addr).await.is_err());

    // Stopping twice is harmless
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn publish_from_plain_thread() {
    let (server, addr) = started(local_config()).await;
    let store = server.frame_store().clone();

    let producer = std::thread::spawn(move || {
        for i in 1..=50u8 {
            store.publish(vec![i; i as usize]);
        }
    });
    producer.join().unwrap();

    let mut client = Client::connect(addr).await;
    client.read_header().await;
    assert_eq!(client.read_part().await.unwrap(), vec![50u8; 50]);

    server.stop().await;
}
