//! The event reactor (§4.8). One `mio::Poll`, one thread; nothing blocks but
//! the poll wait itself. Grounded in the teacher's intended accept/dispatch
//! split (`src/http/http_connection.rs`'s read/write phases, driven here by
//! an explicit `Poll` loop instead of the teacher's unfinished `main.rs`).
//!
//! Producer fds are indexed by token through the owning connection's token
//! (§9: "owning pointers vs. reactor fd indirection" — an arena keyed by
//! stable indices plus a side table fd→index, not raw pointers into an
//! fd→Producer map).

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::process::Child;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::{Endpoint, ServerConfig};
use crate::connection::{ConnStatus, Connection};
use crate::error::Result;

const EVENTS_CAPACITY: usize = 1024;
const POLL_TIMEOUT: Duration = Duration::from_millis(1000);
const LISTEN_BACKLOG: i32 = 128;
const SNDLOWAT: usize = 32768;

/// Idle-connection reaper and CGI watchdog, ambient additions beyond the
/// core's correctness requirements (§5 "Cancellation/timeouts").
const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const CGI_TIMEOUT: Duration = Duration::from_secs(30);
const TIMEOUT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// What a non-listener, non-connection token refers to.
enum PipeOwner {
    CgiRead(Token),
    CgiWrite(Token),
}

struct Tracked {
    conn: Connection,
    last_activity: Instant,
    cgi_started: Option<Instant>,
    cgi_read_token: Option<Token>,
    cgi_write_token: Option<Token>,
}

pub struct Server {
    poll: Poll,
    listeners: HashMap<Token, (TcpListener, Endpoint)>,
    connections: HashMap<Token, Tracked>,
    pipes: HashMap<Token, PipeOwner>,
    config: Arc<ServerConfig>,
    next_token: usize,
    zombies: Vec<Child>,
    last_sweep: Instant,
}

impl Server {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let poll = Poll::new()?;
        let mut listeners = HashMap::new();
        let mut next_token = 0usize;

        for &endpoint in config.endpoints.keys() {
            let mut listener = bind_listener(endpoint)?;
            let token = Token(next_token);
            next_token += 1;
            poll.registry().register(&mut listener, token, Interest::READABLE)?;
            server_log::info!("listening on {}:{}", endpoint.host, endpoint.port);
            listeners.insert(token, (listener, endpoint));
        }

        Ok(Self {
            poll,
            listeners,
            connections: HashMap::new(),
            pipes: HashMap::new(),
            config,
            next_token,
            zombies: Vec::new(),
            last_sweep: Instant::now(),
        })
    }

    /// Run the event loop until the multiplexer primitive itself fails
    /// (§7: "only a failure of the multiplexer primitive itself terminates
    /// the server").
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        loop {
            self.poll.poll(&mut events, Some(POLL_TIMEOUT))?;

            for event in events.iter() {
                let token = event.token();
                if self.listeners.contains_key(&token) {
                    self.accept_all(token)?;
                } else if self.connections.contains_key(&token) {
                    self.drive_connection(token, event.is_readable(), event.is_writable());
                } else if let Some(owner) = self.pipes.get(&token) {
                    let conn_token = match owner {
                        PipeOwner::CgiRead(t) | PipeOwner::CgiWrite(t) => *t,
                    };
                    self.drive_cgi(conn_token);
                }
            }

            self.sweep_timeouts();
            self.reap_zombies();
        }
    }

    fn accept_all(&mut self, listener_token: Token) -> Result<()> {
        loop {
            let (stream, endpoint) = {
                let (listener, endpoint) = self.listeners.get_mut(&listener_token).unwrap();
                match listener.accept() {
                    Ok((stream, _)) => (stream, *endpoint),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                    Err(e) => {
                        server_log::warn!("accept failed: {}", e);
                        return Ok(());
                    }
                }
            };

            let peer_addr = stream.peer_addr().map(|a| a.ip()).unwrap_or(endpoint.host);
            let _ = socket2_set_sndlowat(&stream);

            let token = self.alloc_token();
            let mut conn = Connection::new(stream, peer_addr, endpoint, self.config.clone());
            self.poll.registry().register(&mut conn.stream, token, Interest::READABLE)?;
            server_log::info!("accepted {} on {}:{}", peer_addr, endpoint.host, endpoint.port);

            self.connections.insert(
                token,
                Tracked {
                    conn,
                    last_activity: Instant::now(),
                    cgi_started: None,
                    cgi_read_token: None,
                    cgi_write_token: None,
                },
            );
        }
    }

    fn drive_connection(&mut self, token: Token, readable: bool, writable: bool) {
        let Some(tracked) = self.connections.get_mut(&token) else { return };
        tracked.last_activity = Instant::now();

        if readable {
            let eof = tracked.conn.receive();
            if !eof {
                tracked.conn.handle_request();
            }
        }
        if writable {
            tracked.conn.send();
        }

        self.register_cgi_fds(token);
        self.rearm_or_close(token);
    }

    fn drive_cgi(&mut self, token: Token) {
        let Some(tracked) = self.connections.get_mut(&token) else { return };
        tracked.last_activity = Instant::now();
        tracked.conn.pump_cgi_stdin();
        tracked.conn.pump_cgi_stdout();

        self.register_cgi_fds(token);
        self.rearm_or_close(token);
    }

    /// Register/deregister a connection's CGI pipe fds as its producer
    /// enters and leaves the CGI phase (§4.8: "fds are added/removed as
    /// producers return IoFdPairs").
    fn register_cgi_fds(&mut self, token: Token) {
        let still_cgi = match self.connections.get_mut(&token) {
            Some(tracked) => tracked.conn.cgi_handles().is_some(),
            None => return,
        };
        let already_registered = self
            .connections
            .get(&token)
            .map(|t| t.cgi_read_token.is_some())
            .unwrap_or(false);

        if still_cgi && !already_registered {
            let read_token = Token(self.next_token);
            self.next_token += 1;
            let write_token = Token(self.next_token);
            self.next_token += 1;

            let mut registered_write = false;
            if let Some(tracked) = self.connections.get_mut(&token) {
                if let Some((resp_read, req_write)) = tracked.conn.cgi_handles() {
                    let _ = self.poll.registry().register(resp_read, read_token, Interest::READABLE);
                    if let Some(stream) = req_write {
                        let _ = self.poll.registry().register(stream, write_token, Interest::WRITABLE);
                        registered_write = true;
                    }
                }
                tracked.cgi_read_token = Some(read_token);
                tracked.cgi_started = Some(Instant::now());
                if registered_write {
                    tracked.cgi_write_token = Some(write_token);
                }
            }
            self.pipes.insert(read_token, PipeOwner::CgiRead(token));
            if registered_write {
                self.pipes.insert(write_token, PipeOwner::CgiWrite(token));
            }
        } else if !still_cgi && already_registered {
            if let Some(tracked) = self.connections.get_mut(&token) {
                if let Some(t) = tracked.cgi_read_token.take() {
                    self.pipes.remove(&t);
                }
                if let Some(t) = tracked.cgi_write_token.take() {
                    self.pipes.remove(&t);
                }
                tracked.cgi_started = None;
            }
        }
    }

    fn rearm_or_close(&mut self, token: Token) {
        let Some(tracked) = self.connections.get_mut(&token) else { return };

        if tracked.conn.should_close() {
            self.close_connection(token);
            return;
        }

        let interest = if tracked.conn.is_writable_now() || tracked.conn.has_pending_writes() {
            Interest::WRITABLE
        } else if tracked.conn.status == ConnStatus::NextRequestQueued {
            return;
        } else {
            Interest::READABLE
        };
        let _ = self.poll.registry().reregister(&mut tracked.conn.stream, token, interest);
    }

    fn close_connection(&mut self, token: Token) {
        if let Some(mut tracked) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut tracked.conn.stream);
            if let Some(t) = tracked.cgi_read_token.take() {
                self.pipes.remove(&t);
            }
            if let Some(t) = tracked.cgi_write_token.take() {
                self.pipes.remove(&t);
            }
            if let Some(child) = tracked.conn.abandon_cgi() {
                self.zombies.push(child);
            }
            server_log::info!("closed {}", tracked.conn.peer_addr);
        }
    }

    fn sweep_timeouts(&mut self) {
        if self.last_sweep.elapsed() < TIMEOUT_SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = Instant::now();
        let now = Instant::now();

        let stale: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, t)| now.duration_since(t.last_activity) > CLIENT_IDLE_TIMEOUT)
            .map(|(tok, _)| *tok)
            .collect();
        for token in stale {
            server_log::warn!("idle timeout, closing connection");
            self.close_connection(token);
        }

        let cgi_stuck: Vec<Token> = self
            .connections
            .iter()
            .filter_map(|(tok, t)| {
                t.cgi_started
                    .filter(|started| started.elapsed() > CGI_TIMEOUT)
                    .map(|_| *tok)
            })
            .collect();
        for token in cgi_stuck {
            server_log::warn!("cgi execution timeout, killing child");
            if let Some(tracked) = self.connections.get_mut(&token) {
                if let Some(child) = tracked.conn.abandon_cgi() {
                    self.zombies.push(child);
                }
            }
        }
    }

    fn reap_zombies(&mut self) {
        self.zombies.retain_mut(|child| match child.try_wait() {
            Ok(Some(_)) => false,
            _ => true,
        });
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }
}

fn bind_listener(endpoint: Endpoint) -> Result<TcpListener> {
    let addr = SocketAddr::new(endpoint.host, endpoint.port);
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener))
}

/// Best-effort `SO_SNDLOWAT` on accepted client sockets (§6, §4.8); harmless
/// if the platform refuses it. Borrows the fd into a `Socket` just long
/// enough to call `setsockopt`, then forgets it so the fd stays owned by
/// `stream`.
fn socket2_set_sndlowat(stream: &mio::net::TcpStream) -> std::io::Result<()> {
    use std::os::unix::io::{AsRawFd, FromRawFd};
    let socket = unsafe { Socket::from_raw_fd(stream.as_raw_fd()) };
    let result = socket.set_send_buffer_size(SNDLOWAT);
    std::mem::forget(socket);
    result
}
