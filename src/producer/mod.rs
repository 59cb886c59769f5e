//! Response producers: the static file/upload/delete/autoindex/redirect
//! producer and the CGI producer (§4.4, §4.5). A `Producer` is owned by a
//! `Connection` for exactly one request cycle and yields a `ResponseMeta` +
//! body once `is_complete()`.

pub mod cgi_producer;
pub mod static_producer;

pub use cgi_producer::CgiProducer;
pub use static_producer::StaticProducer;

use crate::http::ResponseMeta;

pub enum Producer {
    Static(StaticProducer),
    Cgi(CgiProducer),
}

impl Producer {
    /// Advance synchronously-completable work (static producer) by one
    /// bounded step. CGI producers only make progress via `pump_stdin`/
    /// `pump_stdout`, driven by the reactor off pipe readiness.
    pub fn execute(&mut self) -> bool {
        match self {
            Producer::Static(p) => p.execute(),
            Producer::Cgi(p) => p.is_complete(),
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            Producer::Static(p) => p.is_complete(),
            Producer::Cgi(p) => p.is_complete(),
        }
    }

    pub fn into_result(self) -> (ResponseMeta, Vec<u8>) {
        match self {
            Producer::Static(p) => p.into_result(),
            Producer::Cgi(p) => p.into_result(),
        }
    }
}
