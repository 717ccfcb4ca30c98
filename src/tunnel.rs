//! CONNECT tunnel driver.
//!
//! After the `200 Connection Established` line, the proxy never looks at
//! the tunneled bytes again, it just pumps them in both directions until
//! either side stops or an idle timeout fires.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ProxyError;
use crate::response::CONNECT_ESTABLISHED;
use crate::upstream;

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to `(host, port)`, replies with the established line, then
/// pumps bytes bidirectionally until either side closes, errors, or goes
/// idle past `IDLE_TIMEOUT`.
pub async fn run(mut client: TcpStream, host: &str, port: u16) -> Result<(), ProxyError> {
    let upstream = match upstream::connect(host, port).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = client.write_all(&crate::response::error_page(502)).await;
            return Err(e);
        }
    };

    client
        .write_all(CONNECT_ESTABLISHED)
        .await
        .map_err(ProxyError::ClientIo)?;

    pump(client, upstream).await;
    Ok(())
}

async fn pump(client: TcpStream, upstream: TcpStream) {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut upstream_read, mut upstream_write) = upstream.into_split();

    let client_to_upstream = async {
        let mut buf = [0u8; 4096];
        loop {
            let n = match timeout(IDLE_TIMEOUT, client_read.read(&mut buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(_)) | Err(_) => return,
            };
            if n == 0 {
                return;
            }
            if upstream_write.write_all(&buf[..n]).await.is_err() {
                return;
            }
        }
    };

    let upstream_to_client = async {
        let mut buf = [0u8; 4096];
        loop {
            let n = match timeout(IDLE_TIMEOUT, upstream_read.read(&mut buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(_)) | Err(_) => return,
            };
            if n == 0 {
                return;
            }
            if client_write.write_all(&buf[..n]).await.is_err() {
                return;
            }
        }
    };

    tokio::select! {
        _ = client_to_upstream => debug!("tunnel closed: client side finished"),
        _ = upstream_to_client => debug!("tunnel closed: upstream side finished"),
    }
}
