//! CLI argument parsing and logging setup.

use tracing_subscriber::EnvFilter;

/// Default listen port when no CLI argument overrides it.
pub const DEFAULT_PORT: u16 = 8080;

pub struct Config {
    pub port: u16,
}

/// Parses `argv[1..]` as an optional `[port]`. More than one extra argument
/// prints usage to stderr and exits the process with status 1.
pub fn parse_args(args: &[String]) -> Config {
    match args.len() {
        0 => Config { port: DEFAULT_PORT },
        1 => match args[0].parse() {
            Ok(port) => Config { port },
            Err(_) => {
                eprintln!("invalid port: {}", args[0]);
                std::process::exit(1);
            }
        },
        _ => {
            eprintln!("usage: proxy_squid [port]");
            std::process::exit(1);
        }
    }
}

/// Installs a `tracing` subscriber honoring `RUSTYSQUID_LOG`, falling back
/// to `info` level when the variable is unset or invalid.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("RUSTYSQUID_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
