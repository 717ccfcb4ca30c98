//! Fixed response bodies: HTTP error pages, the CONNECT "established" line,
//! and the proxy's own self-identifying info page.

use std::time::{SystemTime, UNIX_EPOCH};

pub const SERVER_HEADER: &str = "ProxyServer/1.0";
pub const CONNECT_ESTABLISHED: &[u8] =
    b"HTTP/1.1 200 Connection Established\r\nProxy-agent: ProxyServer/1.0\r\n\r\n";

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

/// RFC-1123 date, e.g. `Tue, 15 Nov 1994 08:12:31 GMT`, computed from the
/// wall clock without pulling in a date/time crate (no example in the pack
/// reaches for one just for this).
pub fn rfc1123_date() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_rfc1123(secs)
}

fn format_rfc1123(epoch_secs: u64) -> String {
    const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let days_since_epoch = epoch_secs / 86_400;
    let secs_of_day = epoch_secs % 86_400;
    let (hour, min, sec) = (
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60,
    );
    let weekday = DAYS[((days_since_epoch + 4) % 7) as usize]; // 1970-01-01 was a Thursday

    let (year, month, day) = civil_from_days(days_since_epoch as i64);

    format!(
        "{weekday}, {day:02} {month} {year} {hour:02}:{min:02}:{sec:02} GMT",
        month = MONTHS[(month - 1) as usize]
    )
}

/// Howard Hinnant's days-from-civil algorithm, run in reverse.
fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as i64;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as i64;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Builds a complete HTTP error response: status line, `Content-Length`,
/// `Connection: close`, `Content-Type: text/html`, `Date`, `Server`, and an
/// HTML body naming the status.
pub fn error_page(status: u16) -> Vec<u8> {
    let reason = reason_phrase(status);
    let body = format!(
        "<html><head><title>{status} {reason}</title></head>\
         <body><h1>{status} {reason}</h1></body></html>"
    );
    build_response(status, reason, &body)
}

/// The fixed `200 OK` info page served when a client addresses the proxy
/// itself — body must contain the literal substring
/// `Proxy Server`.
pub fn info_page() -> Vec<u8> {
    let body = "<html><head><title>Proxy Server</title></head>\
                <body><h1>Proxy Server</h1>\
                <p>This is a forward HTTP proxy with an in-memory response cache.</p>\
                </body></html>";
    build_response(200, "OK", body)
}

fn build_response(status: u16, reason: &str, body: &str) -> Vec<u8> {
    let headers = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Length: {len}\r\n\
         Connection: close\r\n\
         Content-Type: text/html\r\n\
         Date: {date}\r\n\
         Server: {server}\r\n\r\n",
        len = body.len(),
        date = rfc1123_date(),
        server = SERVER_HEADER,
    );
    let mut out = Vec::with_capacity(headers.len() + body.len());
    out.extend_from_slice(headers.as_bytes());
    out.extend_from_slice(body.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_page_contains_marker() {
        let page = info_page();
        let text = String::from_utf8(page).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Proxy Server"));
    }

    #[test]
    fn error_page_has_required_headers() {
        for status in [400, 403, 404, 500, 501, 502, 505] {
            let page = error_page(status);
            let text = String::from_utf8(page).unwrap();
            assert!(text.starts_with(&format!("HTTP/1.1 {status} ")));
            assert!(text.contains("Content-Length:"));
            assert!(text.contains("Connection: close"));
            assert!(text.contains("Content-Type: text/html"));
            assert!(text.contains("Server: ProxyServer/1.0"));
            assert!(text.contains("Date: "));
        }
    }

    #[test]
    fn rfc1123_date_known_epoch() {
        // 2000-01-01T00:00:00Z was a Saturday.
        assert_eq!(format_rfc1123(946_684_800), "Sat, 01 Jan 2000 00:00:00 GMT");
    }
}
