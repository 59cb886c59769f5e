//! `ResponseBuffer` and the header formatter (§4.6). Grounded in the
//! teacher's `HttpResponse` (`to_bytes`/`to_pascal_case`/`handle_error`),
//! rebuilt around the documented header ordering and the FIFO send model
//! instead of a single `to_bytes` call.

use crate::config::Methods;
use crate::http::method::Version;

pub const SEND_BUFF_SIZE: usize = 32768;

const SERVER_SOFTWARE: &str = "BrilliantServer/1.0";

/// Everything the formatter needs beyond the raw body bytes.
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    pub status: u16,
    pub methods: Option<Methods>,
    pub keep_alive: bool,
    pub content_type: Option<String>,
    pub location: Option<String>,
    /// Headers surfaced by a CGI script, already lowercased, duplicates of
    /// the reserved set stripped by the caller.
    pub extra_headers: Vec<(String, String)>,
}

const RESERVED_HEADERS: &[&str] = &["server", "date", "allow", "connection", "content-length"];

fn omits_allow(status: u16) -> bool {
    matches!(status, 301 | 400 | 404) || status >= 500
}

/// Build the status line + header block for `meta`, terminated by CRLFCRLF.
pub fn format_header(version: Version, meta: &ResponseMeta, content_len: usize) -> Vec<u8> {
    let reason = crate::status::reason_phrase(meta.status);
    let mut out = format!("{} {} {}\r\n", version, meta.status, reason).into_bytes();

    push_header(&mut out, "server", SERVER_SOFTWARE);
    push_header(&mut out, "date", &httpdate::fmt_http_date(std::time::SystemTime::now()));

    if !omits_allow(meta.status) {
        if let Some(methods) = meta.methods {
            push_header(&mut out, "allow", &methods.allow_header());
        }
    }

    let close = meta.status >= 500 || !meta.keep_alive;
    push_header(&mut out, "connection", if close { "close" } else { "keep-alive" });

    if content_len > 0 {
        push_header(&mut out, "content-length", &content_len.to_string());
    }

    if let Some(content_type) = &meta.content_type {
        push_header(&mut out, "content-type", content_type);
    }

    if let Some(location) = &meta.location {
        push_header(&mut out, "location", location);
    }

    for (name, value) in &meta.extra_headers {
        if RESERVED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        push_header(&mut out, name, value);
    }

    out.extend_from_slice(b"\r\n");
    out
}

fn push_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
}

/// A queued response occupying one slot in a connection's FIFO. Bytes are
/// sent header-then-content; `offset` tracks the next unsent byte across
/// both.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    pub header: Vec<u8>,
    pub content: Vec<u8>,
    pub is_complete: bool,
    offset: usize,
}

impl ResponseBuffer {
    pub fn new(header: Vec<u8>, content: Vec<u8>) -> Self {
        Self { header, content, is_complete: true, offset: 0 }
    }

    /// A buffer still being filled by a producer (e.g. a CGI response whose
    /// header isn't known yet).
    pub fn pending() -> Self {
        Self { header: Vec::new(), content: Vec::new(), is_complete: false, offset: 0 }
    }

    pub fn total_len(&self) -> usize {
        self.header.len() + self.content.len()
    }

    pub fn is_drained(&self) -> bool {
        self.is_complete && self.offset >= self.total_len()
    }

    /// Up to two contiguous slices (header tail + content head, or content
    /// tail alone) whose combined length is capped at `SEND_BUFF_SIZE`,
    /// mirroring the two-iovec `writev` call described in §4.7.
    pub fn next_iovecs(&self) -> (&[u8], &[u8]) {
        let header_len = self.header.len();
        let mut budget = SEND_BUFF_SIZE;

        if self.offset < header_len {
            let header_tail = &self.header[self.offset..];
            let header_take = header_tail.len().min(budget);
            budget -= header_take;
            let content_take = self.content.len().min(budget);
            (&header_tail[..header_take], &self.content[..content_take])
        } else {
            let content_offset = self.offset - header_len;
            let content_tail = &self.content[content_offset..];
            let take = content_tail.len().min(budget);
            (&content_tail[..take], &[])
        }
    }

    pub fn advance(&mut self, n: usize) {
        self.offset += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Methods;

    #[test]
    fn formats_minimal_header() {
        let meta = ResponseMeta {
            status: 200,
            methods: Some(Methods::GET),
            keep_alive: true,
            content_type: Some("text/plain".to_string()),
            location: None,
            extra_headers: Vec::new(),
        };
        let header = format_header(Version::Http11, &meta, 5);
        let text = String::from_utf8(header).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-length: 5\r\n"));
        assert!(text.contains("content-type: text/plain\r\n"));
        assert!(text.contains("connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn omits_allow_on_404() {
        let meta = ResponseMeta { status: 404, methods: Some(Methods::GET), ..Default::default() };
        let header = format_header(Version::Http11, &meta, 0);
        assert!(!String::from_utf8(header).unwrap().contains("allow:"));
    }

    #[test]
    fn includes_allow_on_405() {
        let meta = ResponseMeta { status: 405, methods: Some(Methods::GET), ..Default::default() };
        let header = format_header(Version::Http11, &meta, 0);
        assert!(String::from_utf8(header).unwrap().contains("allow: GET"));
    }

    #[test]
    fn closes_on_5xx_even_if_keep_alive_requested() {
        let meta = ResponseMeta { status: 500, keep_alive: true, ..Default::default() };
        let header = format_header(Version::Http11, &meta, 0);
        assert!(String::from_utf8(header).unwrap().contains("connection: close"));
    }

    #[test]
    fn response_buffer_splits_header_and_content_across_iovecs() {
        let mut buf = ResponseBuffer::new(b"HEAD".to_vec(), b"BODY".to_vec());
        let (a, b) = buf.next_iovecs();
        assert_eq!(a, b"HEAD");
        assert_eq!(b, b"BODY");
        buf.advance(a.len() + b.len());
        assert!(buf.is_drained());
    }
}
