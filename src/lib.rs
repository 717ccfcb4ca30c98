pub mod cache;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod fingerprint;
pub mod parsing;
pub mod response;
pub mod tunnel;
pub mod upstream;
