//! CGI/1.1 response producer (§4.5). Grounded in the teacher's
//! `ActiveAction::Cgi`/`handle_cgi_event`/`process_cgi_stdout`
//! (`src/cgi.rs`, `src/http/http_connection.rs`): bidirectional
//! `UnixStream::pair()` pipes, nonblocking I/O, incremental header/body
//! split — reworked around the documented 16 KiB header cap, 8192-byte
//! line cap, and 128 MiB body cap, and the four-way response
//! classification in §4.5 step 6.

use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::{FromRawFd, IntoRawFd};
use std::process::{Child, Command, Stdio};

use mio::net::UnixStream;

use crate::error::{Result, ServerError};
use crate::http::ResponseMeta;

const READ_CHUNK: usize = 2048;
const HEADER_BLOCK_MAX: usize = 16384;
const HEADER_LINE_MAX: usize = 8192;
const BODY_MAX: usize = 128 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum Phase {
    ReadingHeaders,
    StreamingBody,
    Done,
    Failed(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Document,
    LocalRedir,
    ClientRedir,
    ClientRedirDoc,
}

pub struct CgiProducer {
    pub resp_read: UnixStream,
    pub req_write: Option<UnixStream>,
    child: Child,
    phase: Phase,
    header_buf: Vec<u8>,
    content: Vec<u8>,
    body_written: usize,
    request_body: Vec<u8>,
    write_offset: usize,
    status: u16,
    headers: Vec<(String, String)>,
    local_redir_target: Option<String>,
}

impl CgiProducer {
    /// Spawn `argv[0]` with `env`, wiring stdin/stdout to fresh pipe pairs.
    pub fn spawn(argv: &[String], env: &[(String, String)], request_body: Vec<u8>) -> Result<Self> {
        let (server_out, script_out) = std::os::unix::net::UnixStream::pair()?;
        server_out.set_nonblocking(true)?;
        let resp_read = UnixStream::from_std(server_out);

        let (server_in, script_in) = std::os::unix::net::UnixStream::pair()?;
        server_in.set_nonblocking(true)?;
        let req_write = UnixStream::from_std(server_in);

        let script_out_file = unsafe { std::fs::File::from_raw_fd(script_out.into_raw_fd()) };
        let script_in_file = unsafe { std::fs::File::from_raw_fd(script_in.into_raw_fd()) };

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .envs(env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .stdin(Stdio::from(script_in_file))
            .stdout(Stdio::from(script_out_file))
            .stderr(Stdio::null());

        let child = cmd
            .spawn()
            .map_err(|e| ServerError::Other(format!("cgi exec failed: {}", e)))?;

        Ok(Self {
            resp_read,
            req_write: Some(req_write),
            child,
            phase: Phase::ReadingHeaders,
            header_buf: Vec::new(),
            content: Vec::new(),
            body_written: 0,
            request_body,
            write_offset: 0,
            status: 200,
            headers: Vec::new(),
            local_redir_target: None,
        })
    }

    /// Write one bounded chunk of the request body to the child's stdin.
    /// Closes the write half once the whole body is flushed.
    pub fn pump_stdin(&mut self) {
        let Some(pipe) = &mut self.req_write else { return };
        if self.write_offset >= self.request_body.len() {
            self.req_write = None;
            return;
        }
        let end = (self.write_offset + 4096).min(self.request_body.len());
        match pipe.write(&self.request_body[self.write_offset..end]) {
            Ok(n) => self.write_offset += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(_) => {
                let _ = self.child.kill();
                self.phase = Phase::Failed(500);
                self.req_write = None;
            }
        }
    }

    /// Read one bounded chunk of the child's stdout and advance the header
    /// or body state accordingly. Returns `true` once terminal.
    pub fn pump_stdout(&mut self) -> bool {
        if matches!(self.phase, Phase::Done | Phase::Failed(_)) {
            return true;
        }
        let mut buf = vec![0u8; READ_CHUNK];
        match self.resp_read.read(&mut buf) {
            Ok(0) => {
                self.finish_classification();
                true
            }
            Ok(n) => {
                self.ingest(&buf[..n]);
                matches!(self.phase, Phase::Done | Phase::Failed(_))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(_) => {
                self.phase = Phase::Failed(500);
                true
            }
        }
    }

    fn ingest(&mut self, chunk: &[u8]) {
        if self.phase == Phase::ReadingHeaders {
            self.header_buf.extend_from_slice(chunk);
            if self.header_buf.len() > HEADER_BLOCK_MAX {
                self.phase = Phase::Failed(500);
                return;
            }
            if let Some(split) = find_header_end(&self.header_buf) {
                let (header_bytes, delim_len) = split;
                let body_start = self.header_buf[header_bytes + delim_len..].to_vec();
                let header_section = self.header_buf[..header_bytes].to_vec();
                if !self.parse_headers(&header_section) {
                    self.phase = Phase::Failed(500);
                    return;
                }
                self.phase = Phase::StreamingBody;
                self.ingest_body(&body_start);
            }
        } else if self.phase == Phase::StreamingBody {
            self.ingest_body(chunk);
        }
    }

    fn ingest_body(&mut self, chunk: &[u8]) {
        if self.content.len() + chunk.len() > BODY_MAX {
            self.phase = Phase::Failed(500);
            return;
        }
        self.content.extend_from_slice(chunk);
    }

    fn parse_headers(&mut self, block: &[u8]) -> bool {
        let text = String::from_utf8_lossy(block);
        for line in text.split('\n') {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if line.len() > HEADER_LINE_MAX {
                return false;
            }
            let Some((name, value)) = line.split_once(':') else { return false };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            match name.as_str() {
                "status" => {
                    self.status = value
                        .split_whitespace()
                        .next()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(200);
                }
                "location" => self.local_redir_target = Some(value),
                n if n.starts_with("x-cgi-") => {}
                _ => self.headers.push((name, value)),
            }
        }
        true
    }

    /// `None` means none of the four response types in step 6 match and the
    /// response is malformed.
    fn classify(&self) -> Option<Classification> {
        match &self.local_redir_target {
            Some(loc) if loc.starts_with('/') => {
                if self.content.is_empty() && self.headers.is_empty() {
                    Some(Classification::LocalRedir)
                } else {
                    None
                }
            }
            Some(_) => {
                if self.content.is_empty() {
                    Some(Classification::ClientRedir)
                } else if self.has_content_type() {
                    Some(Classification::ClientRedirDoc)
                } else {
                    None
                }
            }
            None => {
                if self.has_content_type() {
                    Some(Classification::Document)
                } else {
                    None
                }
            }
        }
    }

    fn has_content_type(&self) -> bool {
        self.headers.iter().any(|(k, _)| k == "content-type")
    }

    fn finish_classification(&mut self) {
        if matches!(self.phase, Phase::Failed(_)) {
            return;
        }
        match self.classify() {
            Some(Classification::Document) | Some(Classification::LocalRedir) => {
                self.phase = Phase::Done;
            }
            Some(Classification::ClientRedir) | Some(Classification::ClientRedirDoc) => {
                self.status = 302;
                self.phase = Phase::Done;
            }
            None => self.phase = Phase::Failed(500),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Failed(_))
    }

    /// `Some(location)` when this producer resolved to a local redirect
    /// that the caller must re-route in-place (§4.5).
    pub fn local_redirect(&self) -> Option<&str> {
        if self.phase == Phase::Done && self.classify() == Some(Classification::LocalRedir) {
            self.local_redir_target.as_deref()
        } else {
            None
        }
    }

    pub fn reap(&mut self) {
        let _ = self.child.try_wait();
    }

    /// Kill the child and hand it back for opportunistic reaping once this
    /// producer's connection is torn down early (peer EOF, parse error on
    /// the same socket, idle timeout).
    pub fn abandon(mut self) -> Child {
        let _ = self.child.kill();
        self.child
    }

    pub fn into_result(self) -> (ResponseMeta, Vec<u8>) {
        let status = match self.phase {
            Phase::Failed(code) => code,
            _ => self.status,
        };
        let content_type = self
            .headers
            .iter()
            .find(|(k, _)| k == "content-type")
            .map(|(_, v)| v.clone());
        let location = self.local_redir_target.clone().filter(|_| status == 302);
        let extra_headers = self
            .headers
            .into_iter()
            .filter(|(k, _)| k != "content-type")
            .collect();
        let meta = ResponseMeta {
            status,
            methods: None,
            keep_alive: true,
            content_type,
            location,
            extra_headers,
        };
        (meta, self.content)
    }
}

fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    if let Some(pos) = find_subsequence(buf, b"\r\n\r\n") {
        return Some((pos, 4));
    }
    find_subsequence(buf, b"\n\n").map(|pos| (pos, 2))
}

fn find_subsequence(buf: &[u8], needle: &[u8]) -> Option<usize> {
    buf.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_split_prefers_crlfcrlf() {
        let buf = b"Content-Type: text/html\r\n\r\nbody";
        assert_eq!(find_header_end(buf), Some((24, 4)));
    }

    #[test]
    fn header_split_falls_back_to_lflf() {
        let buf = b"Content-Type: text/html\n\nbody";
        assert_eq!(find_header_end(buf), Some((24, 2)));
    }
}
