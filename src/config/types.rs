//! Immutable runtime configuration built from the parsed [`super::raw`] tree.
//! Nothing in this module touches the filesystem or the lexer again; once
//! `ServerConfig::build` returns, these values live for the process lifetime.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::config::raw::{RawConfig, RawRoute, RawServer};
use crate::error::{Result, ServerError};
use crate::http::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Methods(u8);

impl Methods {
    pub const GET: Methods = Methods(1 << 0);
    pub const POST: Methods = Methods(1 << 1);
    pub const DELETE: Methods = Methods(1 << 2);

    pub fn from_names(names: &[String]) -> Methods {
        let mut bits = 0u8;
        for name in names {
            bits |= match name.to_ascii_uppercase().as_str() {
                "GET" => Methods::GET.0,
                "POST" => Methods::POST.0,
                "DELETE" => Methods::DELETE.0,
                _ => 0,
            };
        }
        Methods(bits)
    }

    pub fn contains(&self, method: Method) -> bool {
        let bit = match method {
            Method::Get => Methods::GET.0,
            Method::Post => Methods::POST.0,
            Method::Delete => Methods::DELETE.0,
        };
        self.0 & bit != 0
    }

    /// Rendered for the `Allow` header, in GET/POST/DELETE order.
    pub fn allow_header(&self) -> String {
        let mut names = Vec::new();
        if self.0 & Methods::GET.0 != 0 {
            names.push("GET");
        }
        if self.0 & Methods::POST.0 != 0 {
            names.push("POST");
        }
        if self.0 & Methods::DELETE.0 != 0 {
            names.push("DELETE");
        }
        names.join(", ")
    }
}

#[derive(Debug, Clone)]
pub struct Location {
    pub error: bool,
    pub autoindex: bool,
    pub methods: Methods,
    pub body_max: usize,
    pub root: String,
    pub index: String,
    pub upload_path: Option<String>,
    pub redirect_to: Option<String>,
}

impl Location {
    fn from_raw(route: &RawRoute, body_max: usize) -> Self {
        Self {
            error: false,
            autoindex: route.autoindex,
            methods: Methods::from_names(&route.methods),
            body_max,
            root: route.root.clone(),
            index: route.index.clone(),
            upload_path: route.upload_path.clone(),
            redirect_to: route.redirection.clone(),
        }
    }

    fn synthesized_error(server: &RawServer) -> Self {
        Self {
            error: true,
            autoindex: false,
            methods: Methods::default(),
            body_max: server.client_max_body_size,
            root: String::new(),
            index: server.error_page.clone().unwrap_or_default(),
            upload_path: None,
            redirect_to: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationRouter {
    pub error: Location,
    /// Extension → Location, in the order the routes appeared in the file;
    /// a leftmost-by-path-position match wins on ties (§4.3).
    pub cgi_vector: Vec<(String, Location)>,
    /// Path prefix → Location; the router picks the longest matching prefix.
    pub locations: Vec<(String, Location)>,
}

impl LocationRouter {
    fn from_raw(server: &RawServer) -> Self {
        let mut cgi_vector = Vec::new();
        let mut locations = Vec::new();
        for route in &server.routes {
            let location = Location::from_raw(route, server.client_max_body_size);
            if let Some(ext) = &route.cgi_ext {
                cgi_vector.push((ext.clone(), location));
            } else {
                locations.push((route.path.clone(), location));
            }
        }
        Self {
            error: Location::synthesized_error(server),
            cgi_vector,
            locations,
        }
    }

    pub fn match_prefix(&self, path: &str) -> Option<&Location> {
        self.locations
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, location)| location)
    }

    /// Leftmost match by the extension's position in `path` wins.
    pub fn match_cgi<'a>(&'a self, path: &str) -> Option<(&'a str, &'a Location)> {
        self.cgi_vector
            .iter()
            .filter_map(|(ext, location)| path.find(ext.as_str()).map(|pos| (pos, ext, location)))
            .min_by_key(|(pos, _, _)| *pos)
            .map(|(_, ext, location)| (ext.as_str(), location))
    }
}

#[derive(Debug, Clone)]
pub struct ServerRouter {
    pub default: LocationRouter,
    pub vhosts: HashMap<String, LocationRouter>,
}

impl ServerRouter {
    pub fn select(&self, host: &str) -> &LocationRouter {
        self.vhosts.get(host).unwrap_or(&self.default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub endpoints: HashMap<Endpoint, ServerRouter>,
}

impl ServerConfig {
    pub fn build(raw: RawConfig) -> Result<ServerConfig> {
        struct Entry {
            server_name: String,
            default_server: bool,
            router: LocationRouter,
        }

        let mut by_endpoint: HashMap<Endpoint, Vec<Entry>> = HashMap::new();

        for server in &raw.servers {
            let host: IpAddr = server
                .host
                .parse()
                .map_err(|_| ServerError::Other(format!("invalid host address '{}'", server.host)))?;
            let router = LocationRouter::from_raw(server);
            for &port in &server.ports {
                by_endpoint
                    .entry(Endpoint { host, port })
                    .or_default()
                    .push(Entry {
                        server_name: server.server_name.clone(),
                        default_server: server.default_server,
                        router: router.clone(),
                    });
            }
        }

        let mut endpoints = HashMap::new();
        for (endpoint, entries) in by_endpoint {
            let default_index = entries
                .iter()
                .position(|e| e.default_server)
                .unwrap_or(0);
            let mut vhosts = HashMap::new();
            let mut default = None;
            for (idx, entry) in entries.into_iter().enumerate() {
                if idx == default_index {
                    default = Some(entry.router.clone());
                }
                vhosts.insert(entry.server_name, entry.router);
            }
            endpoints.insert(
                endpoint,
                ServerRouter {
                    default: default.expect("endpoint always has at least one entry"),
                    vhosts,
                },
            );
        }

        Ok(ServerConfig { endpoints })
    }
}
