use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use proxy_squid::cache::ProxyCache;
use proxy_squid::config::{self, Config};
use proxy_squid::dispatch::{self, ProxyContext, MAX_CLIENTS};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::init_logging();

    let Config { port } = config::parse_args(&std::env::args().skip(1).collect::<Vec<_>>());

    info!("proxy_squid - forward HTTP proxy with CONNECT tunneling and LRU cache");
    info!("listening on port {port}");
    info!("max clients: {MAX_CLIENTS}");

    let cache = ProxyCache::new();
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let semaphore = Arc::new(Semaphore::new(MAX_CLIENTS));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("received SIGINT, initiating graceful shutdown"),
        }
    };

    let ctx = ProxyContext {
        cache: cache.clone(),
        listen_port: port,
    };

    dispatch::serve(listener, ctx, semaphore.clone(), shutdown).await;

    info!("draining cache before exit");
    cache.clear().await;
    semaphore.close();

    Ok(())
}
