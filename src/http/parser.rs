//! Restartable, incremental request parser. Grounded in the teacher's
//! `HttpRequest` state machine (`examples/kill-ux-01-server/src/http/request.rs`),
//! generalized to the documented phase list and byte limits and decoupled
//! from the reactor: the parser only ever touches its own buffer.

use std::fmt;

use crate::http::headers::HeaderMap;
use crate::http::method::{Method, Version};
use crate::http::request::Request;
use crate::uri::{self, NormalizeMode};

pub const REQUEST_LINE_MAX: usize = 8208;
pub const PATH_MAX: usize = 8192;
pub const METHOD_MAX: usize = 6;
pub const VERSION_MAX: usize = 8;
pub const HEADER_BLOCK_MAX: usize = 16384;
pub const FIELD_NAME_MAX: usize = 64;
pub const FIELD_VALUE_MAX: usize = 8192;
pub const BODY_MAX: usize = 128 * 1024 * 1024;
pub const CHUNK_SIZE_LINE_MAX: usize = 1024;
pub const CHUNK_PAYLOAD_MAX: usize = 8192;

const ALLOWED_CODINGS: &[&str] = &[
    "chunked", "compress", "deflate", "gzip", "identity", "x-gzip", "x-compress",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    BadRequest,
    UriTooLong,
    HeaderFieldsTooLarge,
    NotImplemented,
    VersionNotSupported,
    LengthRequired,
    PayloadTooLarge,
}

impl ParseError {
    pub fn status(&self) -> u16 {
        match self {
            ParseError::BadRequest => 400,
            ParseError::UriTooLong => 414,
            ParseError::HeaderFieldsTooLarge => 431,
            ParseError::NotImplemented => 501,
            ParseError::VersionNotSupported => 505,
            ParseError::LengthRequired => 411,
            ParseError::PayloadTooLarge => 413,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status(), crate::status::reason_phrase(self.status()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    RequestLine,
    Header,
    Content,
    ChunkedSize,
    ChunkedData(usize),
    ChunkedCrlf,
    ChunkedTrailer,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    NeedMoreData,
    Complete,
    Error(ParseError),
}

/// Fields accumulated while a request is mid-flight.
struct InProgress {
    method: Method,
    version: Version,
    path: String,
    query: String,
    host: String,
    header: HeaderMap,
    content: Vec<u8>,
    keep_alive: bool,
}

impl Default for InProgress {
    fn default() -> Self {
        Self {
            method: Method::Get,
            version: Version::Http11,
            path: String::new(),
            query: String::new(),
            host: String::new(),
            header: HeaderMap::new(),
            content: Vec::new(),
            keep_alive: true,
        }
    }
}

pub struct Parser {
    buffer: Vec<u8>,
    cursor: usize,
    phase: Phase,
    in_progress: InProgress,
    header_block_start: usize,
    content_length: usize,
    body_remaining: usize,
    total_body_read: usize,
    chunked: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            cursor: 0,
            phase: Phase::RequestLine,
            in_progress: InProgress::default(),
            header_block_start: 0,
            content_length: 0,
            body_remaining: 0,
            total_body_read: 0,
            chunked: false,
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Best-known HTTP version for the in-flight request, for formatting an
    /// error response before the request line even finishes parsing.
    pub fn known_version(&self) -> Version {
        self.in_progress.version
    }

    pub fn known_keep_alive(&self) -> bool {
        self.in_progress.keep_alive
    }

    /// True while unconsumed bytes remain after a completed parse — the
    /// caller should immediately re-drive `advance` for the pipelined tail.
    pub fn has_pipelined_tail(&self) -> bool {
        self.phase == Phase::RequestLine && self.cursor < self.buffer.len()
    }

    /// Drive the state machine as far as the buffered bytes allow.
    pub fn advance(&mut self) -> Step {
        loop {
            match self.phase {
                Phase::RequestLine => match self.step_request_line() {
                    Ok(true) => continue,
                    Ok(false) => return Step::NeedMoreData,
                    Err(e) => return Step::Error(e),
                },
                Phase::Header => match self.step_header() {
                    Ok(true) => continue,
                    Ok(false) => return Step::NeedMoreData,
                    Err(e) => return Step::Error(e),
                },
                Phase::Content => match self.step_content() {
                    Ok(true) => continue,
                    Ok(false) => return Step::NeedMoreData,
                    Err(e) => return Step::Error(e),
                },
                Phase::ChunkedSize | Phase::ChunkedData(_) | Phase::ChunkedCrlf | Phase::ChunkedTrailer => {
                    match self.step_chunked() {
                        Ok(true) => continue,
                        Ok(false) => return Step::NeedMoreData,
                        Err(e) => return Step::Error(e),
                    }
                }
                Phase::Complete => return Step::Complete,
            }
        }
    }

    /// Consume the finished request and reset for the next one (the
    /// pipelined tail, if any, stays buffered).
    pub fn take_request(&mut self) -> Request {
        self.buffer.drain(..self.cursor);
        self.cursor = 0;
        self.header_block_start = 0;
        let fields = std::mem::take(&mut self.in_progress);
        self.phase = Phase::RequestLine;
        self.content_length = 0;
        self.body_remaining = 0;
        self.total_body_read = 0;
        self.chunked = false;
        Request {
            method: fields.method,
            version: fields.version,
            path: fields.path,
            query: fields.query,
            host: fields.host,
            header: fields.header,
            content: fields.content,
            keep_alive: fields.keep_alive,
        }
    }

    /// Reset to accept a brand-new request, discarding whatever is buffered
    /// (used after a parse error forces the connection to drop the rest of
    /// the pipeline).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.header_block_start = 0;
        self.in_progress = InProgress::default();
        self.phase = Phase::RequestLine;
        self.content_length = 0;
        self.body_remaining = 0;
        self.total_body_read = 0;
        self.chunked = false;
    }

    fn find_crlf(&self, from: usize) -> Option<usize> {
        find_subsequence(&self.buffer, b"\r\n", from)
    }

    fn step_request_line(&mut self) -> Result<bool, ParseError> {
        // Tolerate and skip leading blank lines (RFC 7230 §3.5).
        while self.buffer[self.cursor..].starts_with(b"\r\n") {
            self.cursor += 2;
        }

        let Some(line_end) = self.find_crlf(self.cursor) else {
            if self.buffer.len() - self.cursor > REQUEST_LINE_MAX {
                return Err(ParseError::UriTooLong);
            }
            return Ok(false);
        };
        if line_end - self.cursor > REQUEST_LINE_MAX {
            return Err(ParseError::UriTooLong);
        }

        let line = std::str::from_utf8(&self.buffer[self.cursor..line_end])
            .map_err(|_| ParseError::BadRequest)?;
        let mut parts = line.split(' ').filter(|p| !p.is_empty());
        let (Some(method_str), Some(target), Some(version_str)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::BadRequest);
        };
        if parts.next().is_some() {
            return Err(ParseError::BadRequest);
        }

        let method = parse_method(method_str)?;
        if target.len() > PATH_MAX {
            return Err(ParseError::UriTooLong);
        }
        let version = parse_version(version_str)?;

        let parsed = uri::parse_target(target);
        if !parsed.is_valid {
            return Err(ParseError::BadRequest);
        }
        let normalized_path =
            uri::normalize(&parsed.path, NormalizeMode::HttpParser).ok_or(ParseError::BadRequest)?;

        self.in_progress.method = method;
        self.in_progress.version = version;
        self.in_progress.path = normalized_path;
        self.in_progress.query = parsed.query;
        self.in_progress.host = parsed.host;

        self.cursor = line_end + 2;
        self.header_block_start = self.cursor;
        self.phase = Phase::Header;
        Ok(true)
    }

    fn step_header(&mut self) -> Result<bool, ParseError> {
        if self.cursor - self.header_block_start > HEADER_BLOCK_MAX {
            return Err(ParseError::HeaderFieldsTooLarge);
        }

        let Some(line_end) = self.find_crlf(self.cursor) else {
            if self.buffer.len() - self.header_block_start > HEADER_BLOCK_MAX {
                return Err(ParseError::HeaderFieldsTooLarge);
            }
            return Ok(false);
        };

        if line_end == self.cursor {
            // Blank line: header block done.
            self.cursor = line_end + 2;
            self.finalize_headers()?;
            return Ok(true);
        }

        let line = &self.buffer[self.cursor..line_end];
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(ParseError::BadRequest)?;
        let name = std::str::from_utf8(&line[..colon])
            .map_err(|_| ParseError::BadRequest)?
            .trim();
        if name.is_empty() || name.len() > FIELD_NAME_MAX {
            return Err(ParseError::HeaderFieldsTooLarge);
        }
        let value = std::str::from_utf8(&line[colon + 1..])
            .map_err(|_| ParseError::BadRequest)?
            .trim();
        if value.len() > FIELD_VALUE_MAX {
            return Err(ParseError::HeaderFieldsTooLarge);
        }

        self.in_progress.header.push(name.to_ascii_lowercase(), value.to_string());
        self.cursor = line_end + 2;
        Ok(true)
    }

    fn finalize_headers(&mut self) -> Result<(), ParseError> {
        let header = &self.in_progress.header;
        let version = self.in_progress.version;

        let host_count = header.count("host");
        if version == Version::Http11 && host_count != 1 {
            return Err(ParseError::BadRequest);
        }
        if self.in_progress.host.is_empty() {
            if let Some(host_header) = header.get_first("host") {
                if let Some((host, _)) = uri::parse_host(host_header) {
                    self.in_progress.host = host;
                }
            }
        }

        let te = header.get_first("transfer-encoding");
        let cl_count = header.count("content-length");
        if te.is_some() && cl_count > 0 {
            return Err(ParseError::BadRequest);
        }

        if let Some(te) = te {
            let codings: Vec<String> =
                te.split(',').map(|c| c.trim().to_ascii_lowercase()).collect();
            let mut seen = std::collections::HashSet::new();
            for coding in &codings {
                if !ALLOWED_CODINGS.contains(&coding.as_str()) {
                    return Err(ParseError::NotImplemented);
                }
                if !seen.insert(coding.as_str()) {
                    return Err(ParseError::BadRequest);
                }
            }
            if codings.last().map(|s| s.as_str()) != Some("chunked") {
                return Err(ParseError::BadRequest);
            }
            self.chunked = true;
        } else if cl_count > 1 {
            return Err(ParseError::BadRequest);
        } else if cl_count == 1 {
            let raw = header.get_first("content-length").unwrap();
            let n: usize = raw.parse().map_err(|_| ParseError::BadRequest)?;
            if n > BODY_MAX {
                return Err(ParseError::PayloadTooLarge);
            }
            self.content_length = n;
        } else if self.in_progress.method == Method::Post {
            self.finalize_connection_header();
            return Err(ParseError::LengthRequired);
        }

        self.finalize_connection_header();

        if self.chunked {
            self.phase = Phase::ChunkedSize;
        } else {
            self.body_remaining = self.content_length;
            if self.body_remaining == 0 {
                self.phase = Phase::Complete;
            } else {
                self.phase = Phase::Content;
            }
        }
        Ok(())
    }

    fn finalize_connection_header(&mut self) {
        let header = &self.in_progress.header;
        let default_keep_alive = self.in_progress.version == Version::Http11;
        let mut keep_alive = default_keep_alive;
        for value in header.get_all("connection") {
            for token in value.split(',').map(|t| t.trim().to_ascii_lowercase()) {
                match token.as_str() {
                    "close" => keep_alive = false,
                    "keep-alive" => keep_alive = true,
                    _ => {}
                }
            }
        }
        self.in_progress.keep_alive = keep_alive;
    }

    fn step_content(&mut self) -> Result<bool, ParseError> {
        let available = self.buffer.len() - self.cursor;
        if available == 0 {
            return Ok(false);
        }
        let take = available.min(self.body_remaining);
        self.in_progress
            .content
            .extend_from_slice(&self.buffer[self.cursor..self.cursor + take]);
        self.cursor += take;
        self.body_remaining -= take;
        if self.body_remaining == 0 {
            self.phase = Phase::Complete;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn step_chunked(&mut self) -> Result<bool, ParseError> {
        match self.phase {
            Phase::ChunkedSize => {
                let search_limit = (self.buffer.len() - self.cursor).min(CHUNK_SIZE_LINE_MAX + 2);
                let Some(line_end) =
                    find_subsequence(&self.buffer[..self.cursor + search_limit], b"\r\n", self.cursor)
                else {
                    if self.buffer.len() - self.cursor > CHUNK_SIZE_LINE_MAX {
                        return Err(ParseError::BadRequest);
                    }
                    return Ok(false);
                };
                let line = std::str::from_utf8(&self.buffer[self.cursor..line_end])
                    .map_err(|_| ParseError::BadRequest)?;
                let size_str = line.split(';').next().unwrap_or("").trim();
                let size = usize::from_str_radix(size_str, 16).map_err(|_| ParseError::BadRequest)?;
                if size > CHUNK_PAYLOAD_MAX {
                    return Err(ParseError::BadRequest);
                }
                if self.total_body_read + size > BODY_MAX {
                    return Err(ParseError::PayloadTooLarge);
                }
                self.cursor = line_end + 2;
                if size == 0 {
                    self.phase = Phase::ChunkedTrailer;
                } else {
                    self.phase = Phase::ChunkedData(size);
                }
                Ok(true)
            }
            Phase::ChunkedData(remaining) => {
                let available = self.buffer.len() - self.cursor;
                if available == 0 {
                    return Ok(false);
                }
                let take = available.min(remaining);
                self.in_progress
                    .content
                    .extend_from_slice(&self.buffer[self.cursor..self.cursor + take]);
                self.cursor += take;
                self.total_body_read += take;
                let remaining = remaining - take;
                if remaining == 0 {
                    self.phase = Phase::ChunkedCrlf;
                    Ok(true)
                } else {
                    self.phase = Phase::ChunkedData(remaining);
                    Ok(false)
                }
            }
            Phase::ChunkedCrlf => {
                if self.buffer.len() - self.cursor < 2 {
                    return Ok(false);
                }
                if &self.buffer[self.cursor..self.cursor + 2] != b"\r\n" {
                    return Err(ParseError::BadRequest);
                }
                self.cursor += 2;
                self.phase = Phase::ChunkedSize;
                Ok(true)
            }
            Phase::ChunkedTrailer => {
                let Some(line_end) = self.find_crlf(self.cursor) else {
                    if self.buffer.len() - self.cursor > HEADER_BLOCK_MAX {
                        return Err(ParseError::HeaderFieldsTooLarge);
                    }
                    return Ok(false);
                };
                if line_end == self.cursor {
                    self.cursor = line_end + 2;
                    self.phase = Phase::Complete;
                    return Ok(true);
                }
                // Trailers are parsed but discarded: this server doesn't
                // promise them to anything downstream.
                self.cursor = line_end + 2;
                Ok(true)
            }
            _ => unreachable!(),
        }
    }
}

fn parse_method(s: &str) -> Result<Method, ParseError> {
    match s {
        "GET" => Ok(Method::Get),
        "POST" => Ok(Method::Post),
        "DELETE" => Ok(Method::Delete),
        _ if !s.is_empty() && s.len() <= METHOD_MAX + 2 && s.bytes().all(|b| b.is_ascii_uppercase()) => {
            Err(ParseError::NotImplemented)
        }
        _ => Err(ParseError::BadRequest),
    }
}

fn parse_version(s: &str) -> Result<Version, ParseError> {
    match s {
        "HTTP/1.0" => Ok(Version::Http10),
        "HTTP/1.1" => Ok(Version::Http11),
        _ if s.len() <= VERSION_MAX
            && s.starts_with("HTTP/")
            && s[5..].split('.').count() == 2
            && s[5..].split('.').all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit())) =>
        {
            Err(ParseError::VersionNotSupported)
        }
        _ => Err(ParseError::BadRequest),
    }
}

fn find_subsequence(buffer: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.is_empty() || start > buffer.len() {
        return None;
    }
    buffer[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| start + pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(parser: &mut Parser) -> Request {
        loop {
            match parser.advance() {
                Step::Complete => return parser.take_request(),
                Step::NeedMoreData => panic!("need more data"),
                Step::Error(e) => panic!("parse error: {:?}", e),
            }
        }
    }

    #[test]
    fn parses_simple_get() {
        let mut p = Parser::new();
        p.feed(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let req = complete(&mut p);
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.host, "example.com");
        assert!(req.content.is_empty());
    }

    #[test]
    fn parses_fixed_length_body() {
        let mut p = Parser::new();
        p.feed(b"POST /upload HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello");
        let req = complete(&mut p);
        assert_eq!(req.content, b"hello");
    }

    #[test]
    fn parses_chunked_body() {
        let mut p = Parser::new();
        p.feed(b"POST /cgi.php HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n");
        let req = complete(&mut p);
        assert_eq!(req.content, b"hello");
    }

    #[test]
    fn missing_host_on_http11_is_bad_request() {
        let mut p = Parser::new();
        p.feed(b"GET / HTTP/1.1\r\n\r\n");
        match p.advance() {
            Step::Error(ParseError::BadRequest) => {}
            other => panic!("expected BadRequest, got {:?}", matches!(other, Step::Error(_))),
        }
    }

    #[test]
    fn missing_length_on_post_is_length_required() {
        let mut p = Parser::new();
        p.feed(b"POST /x HTTP/1.1\r\nHost: h\r\n\r\n");
        match p.advance() {
            Step::Error(ParseError::LengthRequired) => {}
            _ => panic!("expected LengthRequired"),
        }
    }

    #[test]
    fn pipelined_requests_leave_a_tail() {
        let mut p = Parser::new();
        p.feed(b"GET /a HTTP/1.1\r\nHost: h\r\n\r\nGET /b HTTP/1.1\r\nHost: h\r\n\r\n");
        let first = complete(&mut p);
        assert_eq!(first.path, "/a");
        assert!(p.has_pipelined_tail());
        let second = complete(&mut p);
        assert_eq!(second.path, "/b");
    }

    #[test]
    fn unknown_uppercase_method_is_not_implemented() {
        let mut p = Parser::new();
        p.feed(b"PATCH /x HTTP/1.1\r\nHost: h\r\n\r\n");
        match p.advance() {
            Step::Error(ParseError::NotImplemented) => {}
            _ => panic!("expected NotImplemented"),
        }
    }
}
