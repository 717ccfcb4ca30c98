use thiserror::Error;

/// Everything that can go wrong while driving one client connection.
///
/// Never escapes a worker task: `dispatch::handle_client` matches on this
/// to pick a status code (or to send nothing at all) and then drops the
/// connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("client io error: {0}")]
    ClientIo(#[source] std::io::Error),

    #[error("failed to parse request")]
    ParseFailure,

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("failed to resolve upstream host")]
    UpstreamResolve,

    #[error("failed to connect upstream: {0}")]
    UpstreamConnect(#[source] std::io::Error),

    #[error("upstream io error: {0}")]
    UpstreamIo(#[source] std::io::Error),

    #[error("response exceeded MAX_ENTRY_SIZE")]
    TooLarge,

    #[error("request exceeded MAX_REQUEST_SIZE")]
    RequestTooLarge,
}

impl ProxyError {
    /// Status code for errors whose response is unambiguous regardless of
    /// which driver produced them. `UpstreamResolve`/`UpstreamConnect` are
    /// deliberately excluded: the exchange driver reports those as 500,
    /// the tunnel driver as 502, so callers on that path match
    /// the variant directly instead of calling this.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProxyError::ClientIo(_) => None,
            ProxyError::ParseFailure => Some(400),
            ProxyError::UnsupportedVersion(_) => Some(400),
            ProxyError::UnsupportedMethod(_) => Some(501),
            ProxyError::UpstreamResolve | ProxyError::UpstreamConnect(_) => None,
            ProxyError::UpstreamIo(_) => None,
            ProxyError::TooLarge => None,
            ProxyError::RequestTooLarge => Some(500),
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
