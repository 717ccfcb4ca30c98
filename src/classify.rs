//! Request classifier & rewriter.
//!
//! Decides, from the raw bytes of one fully-received client request,
//! whether it is a CONNECT tunnel, a direct hit on the proxy's own info
//! page, an origin-form GET that needs rewriting to absolute-form before
//! the rest of the pipeline can treat it uniformly, or an absolute-form
//! request passed straight to the parser. The raw pre-rewrite bytes are
//! always kept alongside the parsed result; they're the fingerprint key.

use crate::error::ProxyError;
use crate::parsing::{self, extract_host};

pub struct ForwardRequest {
    /// Raw client bytes as received, pre-rewrite — the cache fingerprint.
    pub raw: Vec<u8>,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub version: String,
    pub headers: Vec<String>,
}

pub enum Classified {
    SelfInfo,
    Connect { host: String, port: u16 },
    Forward(ForwardRequest),
}

/// `listen_port` is the proxy's own bound port, used to detect a client
/// addressing the proxy itself.
pub fn classify(raw: &[u8], listen_port: u16) -> Result<Classified, ProxyError> {
    if raw.len() >= 8 && raw[..8].eq_ignore_ascii_case(b"CONNECT ") {
        let (host, port) = parse_connect_target(raw).ok_or(ProxyError::ParseFailure)?;
        return Ok(Classified::Connect { host, port });
    }

    let rewritten;
    let effective: &[u8] = if raw.len() >= 5 && &raw[..5] == b"GET /" {
        match origin_form_host_header(raw) {
            Some(host_header) if is_self(&host_header, listen_port) => {
                return Ok(Classified::SelfInfo);
            }
            Some(host_header) => {
                rewritten = rewrite_to_absolute_form(raw, &host_header);
                &rewritten
            }
            None => raw,
        }
    } else {
        raw
    };

    let (method, raw_target, version, headers) =
        parsing::parse_request(effective).ok_or(ProxyError::ParseFailure)?;

    if method.eq_ignore_ascii_case("CONNECT") {
        let (host, port) = split_authority(&raw_target, 443);
        return Ok(Classified::Connect { host, port });
    }
    if method != "GET" {
        return Err(ProxyError::UnsupportedMethod(method));
    }

    let (host, port, path) = split_request_target(&raw_target, &headers)?;

    Ok(Classified::Forward(ForwardRequest {
        raw: raw.to_vec(),
        host,
        port,
        path,
        version,
        headers,
    }))
}

/// `CONNECT host[:port] HTTP/1.x` — read up to the next space as the
/// authority, pre-parse.
fn parse_connect_target(raw: &[u8]) -> Option<(String, u16)> {
    let rest = &raw[8..];
    let space = rest.iter().position(|&b| b == b' ')?;
    let authority = std::str::from_utf8(&rest[..space]).ok()?;
    Some(split_authority(authority, 443))
}

fn split_authority(authority: &str, default_port: u16) -> (String, u16) {
    match authority.rfind(':') {
        Some(pos) => {
            let host = authority[..pos].to_string();
            let port = authority[pos + 1..].parse().unwrap_or(default_port);
            (host, port)
        }
        None => (authority.to_string(), default_port),
    }
}

/// Derives `(host, port, path)` for a GET request target, handling both
/// absolute-form (`http://host[:port]/path`) and origin-form (bare path,
/// host from the `Host:` header) uniformly.
fn split_request_target(
    target: &str,
    headers: &[String],
) -> Result<(String, u16, String), ProxyError> {
    if let Some(rest) = target.strip_prefix("http://") {
        let (authority, path) = match rest.find('/') {
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, "/"),
        };
        let (host, port) = split_authority(authority, 80);
        return Ok((host, port, path.to_string()));
    }

    let (host, port) = extract_host(headers).ok_or(ProxyError::ParseFailure)?;
    Ok((host, port, target.to_string()))
}

/// Scans the raw, not-yet-parsed buffer for a `Host:` line (case
/// insensitive), returning its trimmed value. Used only to decide
/// self-vs-rewrite before the buffer is otherwise touched.
fn origin_form_host_header(raw: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(raw).ok()?;
    for line in text.split("\r\n") {
        if let Some(rest) = line
            .get(..5)
            .filter(|p| p.eq_ignore_ascii_case("host:"))
            .map(|_| &line[5..])
        {
            return Some(rest.trim().to_string());
        }
    }
    None
}

fn is_self(host_header: &str, listen_port: u16) -> bool {
    let candidates = [
        format!("localhost:{listen_port}"),
        format!("127.0.0.1:{listen_port}"),
    ];
    candidates.iter().any(|c| c == host_header)
}

/// Rewrites `GET <path> HTTP/x.y\r\n...` into
/// `GET http://<host><path> HTTP/x.y\r\n...`, preserving everything else
/// byte-for-byte. Operates on string slices at
/// well-defined token boundaries, never raw pointers.
fn rewrite_to_absolute_form(raw: &[u8], host_header: &str) -> Vec<u8> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text.splitn(2, "\r\n");
    let request_line = lines.next().unwrap_or_default();
    let remainder = lines.next().unwrap_or_default();

    let mut tokens = request_line.splitn(3, ' ');
    let method = tokens.next().unwrap_or("GET");
    let path = tokens.next().unwrap_or("/");
    let version = tokens.next().unwrap_or("HTTP/1.1");

    let mut out = format!("{method} http://{host_header}{path} {version}\r\n");
    out.push_str(remainder);
    out.into_bytes()
}
