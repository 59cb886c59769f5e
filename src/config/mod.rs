//! Hand-rolled configuration stack: an indentation-significant YAML-like
//! lexer/parser (no `serde_yaml`), a raw parsed tree mirroring the file
//! shape, and a build step that turns it into the immutable runtime
//! `ServerConfig` the router consults.

pub mod display;
pub mod lexer;
pub mod parser;
pub mod raw;
pub mod tokens;
pub mod types;
pub mod validate;

pub use parser::{ConfigError, ConfigParser, FromYaml, ParseResult};
pub use raw::{RawConfig, RawRoute, RawServer};
pub use types::{Endpoint, Location, LocationRouter, Methods, ServerConfig, ServerRouter};

use std::path::Path;

use crate::error::Result;

/// Read, lex, parse, validate, build, and pretty-print the configuration
/// file at `path`.
pub fn load(path: &Path) -> Result<ServerConfig> {
    let text = std::fs::read_to_string(path)?;
    let raw = RawConfig::from_str(&text)?;
    let validated = validate::validate_configs(raw.servers);
    if validated.is_empty() {
        return Err("no usable server blocks after validation".into());
    }
    display::display_config(&validated);
    ServerConfig::build(RawConfig { servers: validated })
}
