//! End-to-end CONNECT tunnel test through the full dispatcher, complementing
//! the lower-level pump test in `src/tunnel.rs`.

use std::sync::Arc;

use proxy_squid::cache::ProxyCache;
use proxy_squid::dispatch::{self, ProxyContext};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

#[tokio::test]
async fn connect_tunnel_is_transparent_end_to_end() {
    let echo_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let echo_addr = echo_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut sock, _) = echo_listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        loop {
            let n = sock.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            let _ = sock.write_all(&buf[..n]).await;
        }
    });

    let proxy_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy_listener.local_addr().unwrap();
    let ctx = ProxyContext {
        cache: ProxyCache::new(),
        listen_port: proxy_addr.port(),
    };
    let semaphore = Arc::new(Semaphore::new(dispatch::MAX_CLIENTS));
    tokio::spawn(async move {
        dispatch::serve(proxy_listener, ctx, semaphore, std::future::pending()).await;
    });

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(format!("CONNECT {echo_addr} HTTP/1.1\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let mut established = [0u8; proxy_squid::response::CONNECT_ESTABLISHED.len()];
    client.read_exact(&mut established).await.unwrap();
    assert_eq!(&established[..], proxy_squid::response::CONNECT_ESTABLISHED);

    let payload = b"the quick brown fox";
    client.write_all(payload).await.unwrap();
    let mut echoed = [0u8; 20];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, payload);
}
