//! Connection dispatcher and admission control: accepts client connections,
//! acquires a semaphore permit per connection, classifies the request, and
//! routes it to the tunnel or exchange driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::cache::ProxyCache;
use crate::classify::{self, Classified};
use crate::error::ProxyError;
use crate::exchange;
use crate::response;
use crate::tunnel;

/// Concurrent in-flight client connections (bounded via a semaphore,
/// generalized from a rejecting counter to a blocking admission gate).
pub const MAX_CLIENTS: usize = 400;
/// Client request read ceiling before headers are complete.
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;
/// Deadline for receiving a complete request header block.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state handed to every worker: the cache and the listener's own
/// port (needed to detect direct hits on the proxy itself).
#[derive(Clone)]
pub struct ProxyContext {
    pub cache: ProxyCache,
    pub listen_port: u16,
}

/// Runs the accept loop until `shutdown` resolves, spawning one detached
/// worker per accepted connection behind the `MAX_CLIENTS` semaphore. Each
/// worker's permit is dropped at task exit on every path, including panic,
/// so a crashed worker never leaks an admission slot.
pub async fn serve(
    listener: TcpListener,
    ctx: ProxyContext,
    semaphore: Arc<Semaphore>,
    shutdown: impl std::future::Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received, draining");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let permit = match semaphore.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break, // semaphore closed during shutdown
                        };
                        debug!(%addr, "accepted connection");
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            handle_client(stream, ctx).await;
                        });
                    }
                    Err(e) => {
                        error!("accept failed: {e}");
                    }
                }
            }
        }
    }
}

/// Drives one client connection end to end: read the first request,
/// classify it, and run the matching driver. The socket closes on every
/// path either as a side effect of the driver or by simply being dropped.
async fn handle_client(mut stream: TcpStream, ctx: ProxyContext) {
    let raw = match read_request(&mut stream).await {
        Ok(raw) => raw,
        Err(e) => {
            respond_error(&mut stream, &e).await;
            return;
        }
    };

    match classify::classify(&raw, ctx.listen_port) {
        Ok(Classified::SelfInfo) => {
            let _ = tokio::io::AsyncWriteExt::write_all(&mut stream, &response::info_page()).await;
        }
        Ok(Classified::Connect { host, port }) => {
            if let Err(e) = tunnel::run(stream, &host, port).await {
                warn!(%host, "tunnel failed: {e}");
            }
        }
        Ok(Classified::Forward(req)) => {
            if let Err(e) = exchange::run(&mut stream, &req, &ctx.cache).await {
                respond_error(&mut stream, &e).await;
            }
        }
        Err(e) => {
            respond_error(&mut stream, &e).await;
        }
    }
}

/// Reads from `stream` until `\r\n\r\n` is seen, a `MAX_REQUEST_SIZE` ceiling
/// is hit, or `CONNECTION_TIMEOUT` elapses.
async fn read_request(stream: &mut TcpStream) -> Result<Vec<u8>, ProxyError> {
    let mut buf = Vec::with_capacity(4096);
    let mut scratch = [0u8; 4096];

    let result = timeout(CONNECTION_TIMEOUT, async {
        loop {
            if buf.len() > MAX_REQUEST_SIZE {
                return Err(ProxyError::RequestTooLarge);
            }
            if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                return Ok(());
            }
            let n = stream.read(&mut scratch).await.map_err(ProxyError::ClientIo)?;
            if n == 0 {
                return Err(ProxyError::ParseFailure);
            }
            buf.extend_from_slice(&scratch[..n]);
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(buf),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ProxyError::ClientIo(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timed out waiting for request headers",
        ))),
    }
}

/// Translates a `ProxyError` into the status code on the wire.
/// The tunnel driver answers its own upstream failures with 502 inline,
/// so the only upstream-failure variant reaching here is the exchange
/// path's, which maps to 500.
async fn respond_error(stream: &mut TcpStream, err: &ProxyError) {
    let status = match err {
        ProxyError::UpstreamResolve | ProxyError::UpstreamConnect(_) => Some(500),
        ProxyError::ClientIo(_) | ProxyError::UpstreamIo(_) | ProxyError::TooLarge => None,
        other => other.status_code(),
    };

    if let Some(status) = status {
        let _ = tokio::io::AsyncWriteExt::write_all(stream, &response::error_page(status)).await;
    }
}
