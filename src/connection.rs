//! Connection lifecycle (§4.7). Grounded in the teacher's `HttpConnection`
//! (`examples/kill-ux-01-server/src/http/http_connection.rs`): a
//! read-phase/write-phase split driven by the reactor, a FIFO of response
//! buffers, pipelining handled by re-driving the parser after a drained
//! write — reworked around the decoupled `Parser`/`Router`/`Producer`
//! types instead of a monolithic struct.

use std::collections::VecDeque;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::net::IpAddr;
use std::sync::Arc;

use mio::net::TcpStream;

use crate::config::{Endpoint, Methods, ServerConfig};
use crate::http::{ParseError, Parser, Request, ResponseBuffer, ResponseMeta, Step, Version};
use crate::producer::{CgiProducer, Producer, StaticProducer};
use crate::router::{self, RouteDecision};

pub const READ_BUF_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    KeepReading,
    KeepAlive,
    Close,
    Error,
    NextRequestQueued,
}

/// Metadata carried alongside a producer until its response is formatted.
struct InFlight {
    version: Version,
    keep_alive: bool,
    methods: Methods,
    request: Request,
    endpoint: Endpoint,
}

pub struct Connection {
    pub stream: TcpStream,
    pub peer_addr: IpAddr,
    pub endpoint: Endpoint,
    config: Arc<ServerConfig>,
    parser: Parser,
    responses: VecDeque<ResponseBuffer>,
    producer: Option<(Producer, InFlight)>,
    pub status: ConnStatus,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: IpAddr, endpoint: Endpoint, config: Arc<ServerConfig>) -> Self {
        Self {
            stream,
            peer_addr,
            endpoint,
            config,
            parser: Parser::new(),
            responses: VecDeque::new(),
            producer: None,
            status: ConnStatus::KeepReading,
        }
    }

    pub fn should_close(&self) -> bool {
        self.status == ConnStatus::Close && self.responses.is_empty()
    }

    /// Single bounded `recv` into a fixed buffer (§4.7 Receive).
    pub fn receive(&mut self) -> bool {
        let mut buf = [0u8; READ_BUF_SIZE];
        match self.stream.read(&mut buf) {
            Ok(0) => {
                self.status = ConnStatus::Close;
                true
            }
            Ok(n) => {
                self.parser.feed(&buf[..n]);
                false
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(_) => {
                self.status = ConnStatus::Close;
                true
            }
        }
    }

    /// Drive the parser to completion, routing and producing each finished
    /// request, and re-driving for any pipelined tail (§4.7 HandleRequest).
    pub fn handle_request(&mut self) {
        loop {
            if self.producer.is_some() {
                self.status = ConnStatus::NextRequestQueued;
                return;
            }
            match self.parser.advance() {
                Step::NeedMoreData => {
                    self.status = ConnStatus::KeepReading;
                    return;
                }
                Step::Complete => {
                    self.handle_complete_request();
                    if !self.parser.has_pipelined_tail() {
                        return;
                    }
                }
                Step::Error(e) => {
                    self.handle_parse_error(e);
                    return;
                }
            }
        }
    }

    fn handle_parse_error(&mut self, error: ParseError) {
        let version = self.parser.known_version();
        let keep_alive = error == ParseError::LengthRequired && self.parser.known_keep_alive();
        self.parser.reset();
        let meta = ResponseMeta { status: error.status(), keep_alive, ..Default::default() };
        let body = format!("{} {}", meta.status, crate::status::reason_phrase(meta.status)).into_bytes();
        self.enqueue_finished(version, &meta, body);
        self.status = if keep_alive { ConnStatus::KeepAlive } else { ConnStatus::Close };
    }

    fn handle_complete_request(&mut self) {
        let request = self.parser.take_request();
        let version = request.version;
        let keep_alive = request.keep_alive;
        let decision = router::route(&request, &self.config, &self.endpoint);
        self.start_producer(request, decision, version, keep_alive);
    }

    fn start_producer(&mut self, request: Request, decision: RouteDecision, version: Version, keep_alive: bool) {
        if decision.status != 200 {
            self.finish_error_decision(&decision, version, keep_alive);
            return;
        }

        let in_flight = InFlight { version, keep_alive, methods: decision.methods, request, endpoint: self.endpoint };

        if decision.is_cgi {
            let env = decision.cgi_env.clone().unwrap_or_default();
            let argv = decision.cgi_argv.clone().unwrap_or_default();
            match CgiProducer::spawn(&argv, &env, in_flight.request.content.clone()) {
                Ok(cgi) => {
                    self.responses.push_back(ResponseBuffer::pending());
                    self.producer = Some((Producer::Cgi(cgi), in_flight));
                }
                Err(_) => self.finish_error_decision(
                    &RouteDecision { status: 500, error_path: decision.error_path, ..Default::default() },
                    version,
                    keep_alive,
                ),
            }
        } else {
            let mut producer = StaticProducer::new(&decision, &in_flight.request);
            while !producer.execute() {}
            let (meta, body) = producer.into_result();
            self.finish_with(version, in_flight.methods, keep_alive, meta, body);
        }
    }

    fn finish_error_decision(&mut self, decision: &RouteDecision, version: Version, keep_alive: bool) {
        let body = fs::read(&decision.error_path)
            .unwrap_or_else(|_| format!("{} {}", decision.status, crate::status::reason_phrase(decision.status)).into_bytes());
        let meta = ResponseMeta {
            status: decision.status,
            methods: Some(decision.methods),
            keep_alive,
            content_type: Some("text/html".to_string()),
            ..Default::default()
        };
        self.finish_with(version, decision.methods, keep_alive, meta, body);
    }

    fn finish_with(&mut self, version: Version, methods: Methods, keep_alive: bool, mut meta: ResponseMeta, body: Vec<u8>) {
        meta.methods = Some(methods);
        meta.keep_alive = keep_alive && meta.status < 500;
        self.enqueue_finished(version, &meta, body);
        self.status = if meta.keep_alive { ConnStatus::KeepAlive } else { ConnStatus::Close };
    }

    fn enqueue_finished(&mut self, version: Version, meta: &ResponseMeta, body: Vec<u8>) {
        let header = crate::http::response::format_header(version, meta, body.len());
        self.responses.push_back(ResponseBuffer::new(header, body));
    }

    /// Drive the active CGI producer's pipes (§4.7 ExecuteMethod).
    pub fn pump_cgi_stdin(&mut self) {
        if let Some((Producer::Cgi(cgi), _)) = &mut self.producer {
            cgi.pump_stdin();
        }
    }

    pub fn pump_cgi_stdout(&mut self) {
        let done = match &mut self.producer {
            Some((Producer::Cgi(cgi), _)) => cgi.pump_stdout(),
            _ => return,
        };
        if done {
            self.finalize_cgi();
            if self.producer.is_none() {
                // The producer slot is free again: resume any pipelined
                // tail the parser was holding while this CGI ran.
                self.handle_request();
            }
        }
    }

    fn finalize_cgi(&mut self) {
        let Some((Producer::Cgi(mut cgi), in_flight)) = self.producer.take() else { return };
        cgi.reap();

        if let Some(target) = cgi.local_redirect() {
            let mut rewritten = in_flight.request.clone();
            apply_local_redirect(&mut rewritten, target);
            let decision = router::route(&rewritten, &self.config, &self.endpoint);
            self.responses.pop_back();
            self.start_producer(rewritten, decision, in_flight.version, in_flight.keep_alive);
            return;
        }

        let (mut meta, body) = cgi.into_result();
        meta.methods = Some(in_flight.methods);
        meta.keep_alive = in_flight.keep_alive && meta.status < 500;
        let header = crate::http::response::format_header(in_flight.version, &meta, body.len());
        if let Some(slot) = self.responses.back_mut() {
            slot.header = header;
            slot.content = body;
            slot.is_complete = true;
        }
        self.status = if meta.keep_alive { ConnStatus::KeepAlive } else { ConnStatus::Close };
    }

    pub fn cgi_handles(&mut self) -> Option<(&mut mio::net::UnixStream, Option<&mut mio::net::UnixStream>)> {
        match &mut self.producer {
            Some((Producer::Cgi(cgi), _)) => Some((&mut cgi.resp_read, cgi.req_write.as_mut())),
            _ => None,
        }
    }

    /// Kill and hand back any in-flight CGI child so the reactor can reap it
    /// opportunistically after this connection is torn down.
    pub fn abandon_cgi(&mut self) -> Option<std::process::Child> {
        match self.producer.take() {
            Some((Producer::Cgi(cgi), _)) => Some(cgi.abandon()),
            Some((producer, in_flight)) => {
                self.producer = Some((producer, in_flight));
                None
            }
            None => None,
        }
    }

    /// Assemble up to two iovec-equivalents and write them in one call
    /// (§4.7 Send). Returns `true` if the connection should close.
    pub fn send(&mut self) -> bool {
        let Some(front) = self.responses.front() else { return false };
        if !front.is_complete {
            return false;
        }
        let (a, b) = front.next_iovecs();
        if a.is_empty() && b.is_empty() {
            return false;
        }
        let mut combined = Vec::with_capacity(a.len() + b.len());
        combined.extend_from_slice(a);
        combined.extend_from_slice(b);
        match self.stream.write(&combined) {
            Ok(n) => {
                let front = self.responses.front_mut().unwrap();
                front.advance(n);
                if front.is_drained() {
                    self.responses.pop_front();
                }
                false
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(_) => {
                self.status = ConnStatus::Close;
                true
            }
        }
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.responses.is_empty()
    }

    pub fn is_writable_now(&self) -> bool {
        matches!(self.responses.front(), Some(r) if r.is_complete)
    }
}

fn apply_local_redirect(request: &mut Request, target: &str) {
    let parsed = crate::uri::parse_target(target);
    if parsed.is_valid {
        request.path = parsed.path;
        request.query = parsed.query;
        if !parsed.host.is_empty() {
            request.host = parsed.host;
        }
    }
}
