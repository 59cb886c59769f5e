//! `brilliant_server`: a single-threaded, event-driven HTTP/1.0-1.1 origin
//! server with CGI/1.1 support, built around a `mio::Poll` reactor.

pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod mime;
pub mod producer;
pub mod reactor;
pub mod router;
pub mod status;
pub mod uri;
