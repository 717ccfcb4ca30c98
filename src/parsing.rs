//! Thin glue around `httparse`: turns raw bytes into the plain tuples the
//! rest of the core works with.

/// `(method, path, version, headers)`, headers serialized as
/// `"Name: value"` lines, version as the literal `HTTP/1.0`/`HTTP/1.1`.
pub fn parse_request(data: &[u8]) -> Option<(String, String, String, Vec<String>)> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(data) {
        Ok(httparse::Status::Complete(_)) => {
            let method = req.method?.to_string();
            let path = req.path?.to_string();
            let version = match req.version? {
                0 => "HTTP/1.0",
                1 => "HTTP/1.1",
                _ => return None,
            }
            .to_string();
            let headers: Vec<String> = req
                .headers
                .iter()
                .map(|h| format!("{}: {}", h.name, String::from_utf8_lossy(h.value)))
                .collect();
            Some((method, path, version, headers))
        }
        _ => None,
    }
}

/// `(status_line, headers, body)` from a complete upstream response.
pub fn parse_response(data: &[u8]) -> Option<(String, Vec<String>, &[u8])> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut response = httparse::Response::new(&mut headers);

    match response.parse(data) {
        Ok(httparse::Status::Complete(header_len)) => {
            let status = response.code?;
            let status_line = format!(
                "HTTP/1.1 {} {}\r\n",
                status,
                response.reason.unwrap_or("OK")
            );
            let headers: Vec<String> = response
                .headers
                .iter()
                .map(|h| format!("{}: {}", h.name, String::from_utf8_lossy(h.value)))
                .collect();
            let body = &data[header_len..];
            Some((status_line, headers, body))
        }
        _ => None,
    }
}

/// Pulls `(host, port)` out of a serialized `Host:` header, defaulting the
/// port to 80 when absent.
pub fn extract_host(headers: &[String]) -> Option<(String, u16)> {
    for header in headers {
        if header.to_lowercase().starts_with("host:") {
            let host_value = header[5..].trim();
            if let Some(colon_pos) = host_value.rfind(':') {
                let host = host_value[..colon_pos].to_string();
                let port = host_value[colon_pos + 1..].parse::<u16>().unwrap_or(80);
                return Some((host, port));
            }
            return Some((host_value.to_string(), 80));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_origin_form_get() {
        let (method, path, version, headers) =
            parse_request(b"GET /test HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
        assert_eq!(method, "GET");
        assert_eq!(path, "/test");
        assert_eq!(version, "HTTP/1.1");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn parses_http_1_0() {
        let (_, _, version, _) = parse_request(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(version, "HTTP/1.0");
    }

    #[test]
    fn rejects_truncated_request() {
        assert!(parse_request(b"GET /\r\n\r\n").is_none());
        assert!(parse_request(b"").is_none());
    }

    #[test]
    fn extracts_host_and_port() {
        assert_eq!(
            extract_host(&["Host: example.com".to_string()]),
            Some(("example.com".to_string(), 80))
        );
        assert_eq!(
            extract_host(&["Host: example.com:8080".to_string()]),
            Some(("example.com".to_string(), 8080))
        );
        assert_eq!(extract_host(&[]), None);
    }

    #[test]
    fn parses_upstream_response() {
        let (status_line, headers, body) =
            parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi").unwrap();
        assert_eq!(status_line, "HTTP/1.1 200 OK\r\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(body, b"hi");
    }
}
