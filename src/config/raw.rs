//! The file-facing shape of a server block, straight off the parser.
//!
//! [`super::types`] turns a `Vec<RawServer>` into the immutable
//! `ServerConfig` the router actually consults; nothing here is used after
//! startup.

use derive_yaml::FromYaml;

use crate::config::parser::FromYaml;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576;
pub const DEFAULT_ROUTE_PATH: &str = "/";
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_INDEX: &str = "index.html";

#[derive(Debug, Clone, FromYaml)]
pub struct RawConfig {
    pub servers: Vec<RawServer>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self { servers: Vec::new() }
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct RawServer {
    pub host: String,
    pub ports: Vec<u16>,
    pub server_name: String,
    pub default_server: bool,
    pub error_page: Option<String>,
    pub client_max_body_size: usize,
    pub routes: Vec<RawRoute>,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            server_name: DEFAULT_SERVER_NAME.to_string(),
            default_server: false,
            error_page: None,
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct RawRoute {
    pub path: String,
    pub methods: Vec<String>,
    pub redirection: Option<String>,
    pub root: String,
    pub index: String,
    pub upload_path: Option<String>,
    pub cgi_ext: Option<String>,
    pub autoindex: bool,
}

impl Default for RawRoute {
    fn default() -> Self {
        Self {
            path: DEFAULT_ROUTE_PATH.to_string(),
            methods: vec!["GET".to_string()],
            redirection: None,
            root: DEFAULT_ROOT.to_string(),
            index: DEFAULT_INDEX.to_string(),
            upload_path: None,
            cgi_ext: None,
            autoindex: false,
        }
    }
}
