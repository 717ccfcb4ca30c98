//! Upstream connection establishment. Every request opens a fresh TCP
//! connection to the origin; connections are never pooled or reused.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::ProxyError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves `host` and opens a TCP connection to `(host, port)`, bounded by
/// `CONNECT_TIMEOUT`. DNS resolution happens inside `TcpStream::connect`
/// itself; the OS resolver's first successful address wins.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream, ProxyError> {
    match timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ProxyError::UpstreamConnect(e)),
        Err(_) => Err(ProxyError::UpstreamConnect(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connect timed out",
        ))),
    }
}
