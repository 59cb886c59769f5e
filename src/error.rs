//! Crate-wide error type. Every fallible operation in this crate returns
//! `Result<T>` and propagates through `?`; nothing panics outside of tests.

use std::fmt::{self, Debug, Display, Formatter};

use crate::config::ConfigError;

pub enum ServerError {
    Io(std::io::Error),
    Config(ConfigError),
    Addr(std::net::AddrParseError),
    Other(String),
}

impl Debug for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "\x1b[31mI/O error\x1b[0m: {}", e),
            ServerError::Config(e) => write!(f, "\x1b[31mconfig error\x1b[0m: {}", e),
            ServerError::Addr(e) => write!(f, "\x1b[31maddress error\x1b[0m: {}", e),
            ServerError::Other(s) => write!(f, "\x1b[31merror\x1b[0m: {}", s),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(e)
    }
}

impl From<ConfigError> for ServerError {
    fn from(e: ConfigError) -> Self {
        ServerError::Config(e)
    }
}

impl From<std::net::AddrParseError> for ServerError {
    fn from(e: std::net::AddrParseError) -> Self {
        ServerError::Addr(e)
    }
}

impl From<String> for ServerError {
    fn from(s: String) -> Self {
        ServerError::Other(s)
    }
}

impl From<&str> for ServerError {
    fn from(s: &str) -> Self {
        ServerError::Other(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
