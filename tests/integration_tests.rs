//! End-to-end tests driving a real listener through `dispatch::serve`
//! against a locally bound mock origin server. The CONNECT tunnel case
//! lives in `tunnel_test.rs`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proxy_squid::cache::ProxyCache;
use proxy_squid::dispatch::{self, ProxyContext};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// Spawns a mock origin that replies with `response` to every connection it
/// accepts, tracking how many connections it saw.
async fn spawn_mock_origin(response: &'static [u8]) -> (std::net::SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            hits_clone.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let _ = sock.write_all(response).await;
            });
        }
    });

    (addr, hits)
}

/// Spawns the proxy's dispatcher on an ephemeral port and returns its
/// address; the serve task is detached and outlives the test.
async fn spawn_proxy() -> (std::net::SocketAddr, ProxyCache) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cache = ProxyCache::new();
    let ctx = ProxyContext {
        cache: cache.clone(),
        listen_port: addr.port(),
    };
    let semaphore = Arc::new(Semaphore::new(dispatch::MAX_CLIENTS));

    tokio::spawn(async move {
        dispatch::serve(listener, ctx, semaphore, std::future::pending()).await;
    });

    (addr, cache)
}

async fn send_and_read(proxy_addr: std::net::SocketAddr, request: &[u8]) -> String {
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(request).await.unwrap();
    client.shutdown().await.unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).to_string()
}

#[tokio::test]
async fn cache_hit_skips_second_upstream_call() {
    let (origin_addr, hits) =
        spawn_mock_origin(b"HTTP/1.0 200 OK\r\nContent-Length: 3\r\n\r\nhi!").await;
    let (proxy_addr, _cache) = spawn_proxy().await;

    let request = format!(
        "GET http://{} HTTP/1.0\r\nHost: {}\r\n\r\n",
        origin_addr, origin_addr
    );

    let first = send_and_read(proxy_addr, request.as_bytes()).await;
    assert!(first.starts_with("HTTP/1.0 200 OK"));
    assert!(first.ends_with("hi!"));

    // Give the background cache-insertion task a moment to land.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second = send_and_read(proxy_addr, request.as_bytes()).await;
    assert!(second.ends_with("hi!"));

    assert_eq!(hits.load(Ordering::SeqCst), 1, "origin must be hit only once");
}

#[tokio::test]
async fn origin_form_request_is_rewritten_but_fingerprint_stays_raw() {
    let (origin_addr, hits) =
        spawn_mock_origin(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
    let (proxy_addr, _cache) = spawn_proxy().await;

    let request = format!(
        "GET /foo HTTP/1.1\r\nHost: {}\r\n\r\n",
        origin_addr
    );
    let response = send_and_read(proxy_addr, request.as_bytes()).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn direct_hit_on_proxy_serves_info_page() {
    let (proxy_addr, _cache) = spawn_proxy().await;

    let request = format!(
        "GET / HTTP/1.1\r\nHost: 127.0.0.1:{}\r\n\r\n",
        proxy_addr.port()
    );
    let response = send_and_read(proxy_addr, request.as_bytes()).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("Proxy Server"));
}

#[tokio::test]
async fn unsupported_method_returns_501() {
    let (proxy_addr, _cache) = spawn_proxy().await;

    let request = b"POST http://example.test/ HTTP/1.1\r\nHost: example.test\r\n\r\n";
    let response = send_and_read(proxy_addr, request).await;
    assert!(response.starts_with("HTTP/1.1 501 "));
}

#[tokio::test]
async fn malformed_request_returns_400() {
    let (proxy_addr, _cache) = spawn_proxy().await;

    let response = send_and_read(proxy_addr, b"not a request\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 "));
}

#[tokio::test]
async fn oversize_response_is_forwarded_but_not_cached() {
    let body = vec![b'x'; proxy_squid::cache::MAX_ENTRY_SIZE + 1024];
    let mut oversize_response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    oversize_response.extend_from_slice(&body);
    let oversize_response: &'static [u8] = Box::leak(oversize_response.into_boxed_slice());

    let (origin_addr, hits) = spawn_mock_origin(oversize_response).await;
    let (proxy_addr, _cache) = spawn_proxy().await;

    let request = format!(
        "GET http://{} HTTP/1.0\r\nHost: {}\r\n\r\n",
        origin_addr, origin_addr
    );

    let first = send_and_read(proxy_addr, request.as_bytes()).await;
    assert!(first.starts_with("HTTP/1.1 200 OK"));
    assert!(first.len() > proxy_squid::cache::MAX_ENTRY_SIZE);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second = send_and_read(proxy_addr, request.as_bytes()).await;
    assert!(second.starts_with("HTTP/1.1 200 OK"));

    assert_eq!(
        hits.load(Ordering::SeqCst),
        2,
        "an oversize response must never be cached, so the origin is hit again"
    );
}
