//! The HTTP front end over a real socket.

use std::sync::Arc;
use std::time::Duration;

use pingwatch::{server, LedgerConfig, Monitor};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const T0: u64 = 1_000 * 600_000;

async fn start(static_dir: &std::path::Path) -> (Arc<Monitor>, std::net::SocketAddr) {
    let monitor = Arc::new(Monitor::new(
        ["1.1.1.1", "192.168.1.1"],
        LedgerConfig::default(),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    server::start_server(listener, monitor.clone(), static_dir.to_path_buf());
    (monitor, addr)
}

async fn request(addr: std::net::SocketAddr, method: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    response
}

/// Read from `stream` until `needle` has been seen.
async fn read_until(stream: &mut TcpStream, buf: &mut String, needle: &str) {
    let mut chunk = [0u8; 4096];
    while !buf.contains(needle) {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 0, "stream closed before {needle:?}");
        buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
    }
}

#[tokio::test]
async fn health_endpoints() {
    let dir = TempDir::new().unwrap();
    let (_monitor, addr) = start(dir.path()).await;

    for path in ["/health", "/healthz"] {
        let response = request(addr, "GET", path).await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("OK"));
    }
}

#[tokio::test]
async fn static_files_and_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "<title>pingwatch</title>").unwrap();
    let (_monitor, addr) = start(dir.path()).await;

    let index = request(addr, "GET", "/").await;
    assert!(index.starts_with("HTTP/1.1 200 OK"));
    assert!(index.contains("text/html"));
    assert!(index.ends_with("<title>pingwatch</title>"));

    let missing = request(addr, "GET", "/nope.js").await;
    assert!(missing.starts_with("HTTP/1.1 404"));

    let escape = request(addr, "GET", "/../Cargo.toml").await;
    assert!(escape.starts_with("HTTP/1.1 404"));

    let post = request(addr, "POST", "/events").await;
    assert!(post.starts_with("HTTP/1.1 405"));
}

#[tokio::test]
async fn state_endpoint_returns_history() {
    let dir = TempDir::new().unwrap();
    let (monitor, addr) = start(dir.path()).await;
    monitor.handle_line_at("1.1.1.1", "icmp_seq=1 time=12.5 ms", T0);

    let response = request(addr, "GET", "/api/state").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("application/json"));
    assert!(response.contains(r#""type":"history""#));
    assert!(response.contains(r#""avgRtt":12.5"#));
}

#[tokio::test]
async fn event_stream_sends_history_then_updates() {
    let dir = TempDir::new().unwrap();
    let (monitor, addr) = start(dir.path()).await;
    monitor.handle_line_at("1.1.1.1", "icmp_seq=1 time=10 ms", T0);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /events HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut received = String::new();
    read_until(&mut stream, &mut received, r#""type":"history""#).await;
    assert!(received.starts_with("HTTP/1.1 200 OK"));
    assert!(received.contains("text/event-stream"));
    assert_eq!(monitor.hub().len(), 1);

    monitor.handle_line_at(
        "192.168.1.1",
        "From 192.168.1.7 icmp_seq=1 Destination Host Unreachable",
        T0 + 1000,
    );
    read_until(&mut stream, &mut received, r#""type":"loss""#).await;
    assert!(received.contains(r#""target":"192.168.1.1""#));

    monitor.hub().heartbeat();
    read_until(&mut stream, &mut received, ": keep-alive").await;

    drop(stream);
    for _ in 0..50 {
        if monitor.hub().is_empty() {
            break;
        }
        monitor.hub().heartbeat();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(monitor.hub().is_empty());
}
