//! HTTP exchange driver: builds and sends the upstream request, streams the
//! response back to the client, and opportunistically caches it.

use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::cache::{CachedResponse, ProxyCache, MAX_ENTRY_SIZE};
use crate::classify::ForwardRequest;
use crate::error::ProxyError;
use crate::fingerprint;
use crate::parsing;
use crate::upstream;

const MAX_BYTES: usize = 4096;
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Serves `req` from cache if possible, otherwise forwards it upstream,
/// streaming the response to `client` and caching it on a cacheable miss.
pub async fn run(
    client: &mut TcpStream,
    req: &ForwardRequest,
    cache: &ProxyCache,
) -> Result<(), ProxyError> {
    let fp = fingerprint::fingerprint(&req.raw);

    if req.method_is_get() {
        if let Some(cached) = cache.get(fp).await {
            info!(host = %req.host, path = %req.path, "cache hit");
            return replay(client, &cached).await;
        }
    }

    forward(client, req, cache, fp).await
}

async fn replay(client: &mut TcpStream, cached: &CachedResponse) -> Result<(), ProxyError> {
    client
        .write_all(cached.status_line.as_bytes())
        .await
        .map_err(ProxyError::ClientIo)?;
    for header in &cached.headers {
        client
            .write_all(header.as_bytes())
            .await
            .map_err(ProxyError::ClientIo)?;
        client.write_all(b"\r\n").await.map_err(ProxyError::ClientIo)?;
    }
    client.write_all(b"\r\n").await.map_err(ProxyError::ClientIo)?;
    client
        .write_all(&cached.body)
        .await
        .map_err(ProxyError::ClientIo)
}

async fn forward(
    client: &mut TcpStream,
    req: &ForwardRequest,
    cache: &ProxyCache,
    fp: u64,
) -> Result<(), ProxyError> {
    let request_bytes = build_request(req)?;

    let mut upstream = upstream::connect(&req.host, req.port).await.map_err(|e| {
        warn!(host = %req.host, "upstream connect failed");
        e
    })?;
    upstream
        .write_all(&request_bytes)
        .await
        .map_err(ProxyError::UpstreamIo)?;

    let mut assembled = BytesMut::with_capacity(MAX_BYTES);
    let mut scratch = [0u8; MAX_BYTES];
    let mut total_size = 0usize;
    let mut overflowed = false;

    loop {
        let n = match timeout(READ_IDLE_TIMEOUT, upstream.read(&mut scratch)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(ProxyError::UpstreamIo(e)),
            Err(_) => {
                return Err(ProxyError::UpstreamIo(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "upstream read timed out",
                )))
            }
        };

        total_size += n;
        client
            .write_all(&scratch[..n])
            .await
            .map_err(ProxyError::ClientIo)?;

        if total_size > MAX_ENTRY_SIZE {
            overflowed = true;
            // Keep forwarding without buffering further; the response is
            // already too large to cache.
            let mut rest = [0u8; MAX_BYTES];
            loop {
                match upstream.read(&mut rest).await {
                    Ok(0) => break,
                    Ok(n) => client
                        .write_all(&rest[..n])
                        .await
                        .map_err(ProxyError::ClientIo)?,
                    Err(_) => break,
                }
            }
            break;
        }
        assembled.extend_from_slice(&scratch[..n]);
    }

    if !overflowed && req.method_is_get() {
        cache_response(cache, fp, &assembled.freeze());
    }

    Ok(())
}

fn cache_response(cache: &ProxyCache, fp: u64, data: &Bytes) {
    let Some((status_line, headers, body)) = parsing::parse_response(data) else {
        return;
    };

    let cached = CachedResponse {
        status_line,
        headers,
        body: Bytes::copy_from_slice(body),
    };

    let cache = cache.clone();
    tokio::spawn(async move {
        if cache.put(fp, cached).await {
            info!("cached response");
        } else {
            warn!("cache rejected response (too large)");
        }
    });
}

/// `"GET " + path + " " + version + "\r\n"` plus headers, forcing
/// `Connection: close` and filling in `Host` if missing.
fn build_request(req: &ForwardRequest) -> Result<Vec<u8>, ProxyError> {
    let mut out = format!("GET {} {}\r\n", req.path, req.version).into_bytes();

    let has_host = req
        .headers
        .iter()
        .any(|h| h.to_lowercase().starts_with("host:"));
    if !has_host {
        out.extend_from_slice(format!("Host: {}\r\n", req.host).as_bytes());
    }
    for header in &req.headers {
        if header.to_lowercase().starts_with("connection:") {
            continue;
        }
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"Connection: close\r\n");
    out.extend_from_slice(b"\r\n");

    if out.len() > MAX_BYTES {
        return Err(ProxyError::RequestTooLarge);
    }
    Ok(out)
}

impl ForwardRequest {
    fn method_is_get(&self) -> bool {
        true // classify() only ever produces ForwardRequest for GET
    }
}
