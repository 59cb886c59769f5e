//! Host→location→method resolution, CGI discrimination, and redirect
//! shortcut (§4.3). Decoupled from connection/reactor state: `route` is a
//! pure function of a request, the selected endpoint, and the immutable
//! configuration.

pub mod cgi_env;

use crate::config::{Endpoint, Location, Methods, ServerConfig};
use crate::http::Request;
use crate::uri::{self, NormalizeMode};

#[derive(Debug, Clone, Default)]
pub struct RouteDecision {
    pub is_cgi: bool,
    pub status: u16,
    pub methods: Methods,
    pub success_path: String,
    pub error_path: String,
    pub redirect_to: Option<String>,
    pub autoindex: bool,
    /// Index filename for directory resolution (static GET only).
    pub index: String,
    pub upload_path: Option<String>,
    pub cgi_env: Option<Vec<(String, String)>>,
    pub cgi_argv: Option<Vec<String>>,
}

/// Route `request` against the configuration for `endpoint`, per §4.3's
/// eight-step algorithm. Only called once the parser has produced a
/// complete request; step 8 (parse-status precedence) is the caller's
/// responsibility since this function has no access to that status.
pub fn route(request: &Request, config: &ServerConfig, endpoint: &Endpoint) -> RouteDecision {
    let server_router = config
        .endpoints
        .get(endpoint)
        .expect("connection only routes against an endpoint it is bound to");
    let location_router = server_router.select(&request.host);
    let error_path = location_router.error.index.clone();

    if let Some((ext, location)) = location_router.match_cgi(&request.path) {
        return route_cgi(request, endpoint, location, ext, &error_path);
    }

    match location_router.match_prefix(&request.path) {
        Some(location) => route_static(request, location, &error_path),
        None => RouteDecision { status: 404, error_path, ..Default::default() },
    }
}

fn route_static(request: &Request, location: &Location, error_path: &str) -> RouteDecision {
    let base = RouteDecision {
        methods: location.methods,
        error_path: error_path.to_string(),
        autoindex: location.autoindex,
        index: location.index.clone(),
        upload_path: location.upload_path.clone(),
        ..Default::default()
    };

    if !location.methods.contains(request.method) {
        return RouteDecision { status: 405, ..base };
    }
    if let Some(target) = &location.redirect_to {
        return RouteDecision { status: 301, redirect_to: Some(target.clone()), ..base };
    }
    if location.body_max < request.content.len() {
        return RouteDecision { status: 413, ..base };
    }

    let suffix = if request.path.ends_with('/') && !location.index.is_empty() {
        location.index.clone()
    } else {
        String::new()
    };
    let raw_success_path = format!(".{}{}{}", location.root, request.path, suffix);
    let success_path =
        uri::normalize(&raw_success_path, NormalizeMode::Router).unwrap_or(raw_success_path);

    RouteDecision { status: 200, success_path, ..base }
}

fn route_cgi(
    request: &Request,
    endpoint: &Endpoint,
    location: &Location,
    ext: &str,
    error_path: &str,
) -> RouteDecision {
    let base = RouteDecision {
        is_cgi: true,
        methods: location.methods,
        error_path: error_path.to_string(),
        ..Default::default()
    };

    if !location.methods.contains(request.method) {
        return RouteDecision { status: 405, ..base };
    }
    if let Some(target) = &location.redirect_to {
        return RouteDecision { status: 301, redirect_to: Some(target.clone()), ..base };
    }
    if location.body_max < request.content.len() {
        return RouteDecision { status: 413, ..base };
    }

    let script_name_tail = request.path_up_to_ext(ext);
    let path_info = request.path_info(ext);
    let raw_success_path = format!(".{}{}", location.root, script_name_tail);
    let success_path =
        uri::normalize(&raw_success_path, NormalizeMode::Router).unwrap_or(raw_success_path);

    let cgi_env = cgi_env::build_env(request, location, endpoint, script_name_tail, &path_info);
    let cgi_argv = cgi_env::build_argv(&success_path, &request.query);

    RouteDecision {
        status: 200,
        success_path,
        cgi_env: Some(cgi_env),
        cgi_argv: Some(cgi_argv),
        ..base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RawConfig, RawRoute, RawServer, ServerConfig as Cfg};
    use crate::http::{HeaderMap, Method, Version};
    use std::net::{IpAddr, Ipv4Addr};

    fn endpoint() -> Endpoint {
        Endpoint { host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port: 8080 }
    }

    fn build_config() -> Cfg {
        let raw = RawConfig {
            servers: vec![RawServer {
                host: "127.0.0.1".to_string(),
                ports: vec![8080],
                server_name: "_".to_string(),
                default_server: true,
                error_page: None,
                client_max_body_size: 1024,
                routes: vec![
                    RawRoute {
                        path: "/".to_string(),
                        methods: vec!["GET".to_string()],
                        redirection: None,
                        root: "/www".to_string(),
                        index: "index.html".to_string(),
                        upload_path: None,
                        cgi_ext: None,
                        autoindex: false,
                    },
                    RawRoute {
                        path: "/up".to_string(),
                        methods: vec!["POST".to_string()],
                        redirection: None,
                        root: "/www/up".to_string(),
                        index: String::new(),
                        upload_path: Some("/www/uploads".to_string()),
                        cgi_ext: None,
                        autoindex: false,
                    },
                    RawRoute {
                        path: String::new(),
                        methods: vec!["GET".to_string()],
                        redirection: None,
                        root: "/www/cgi-bin".to_string(),
                        index: String::new(),
                        upload_path: None,
                        cgi_ext: Some(".php".to_string()),
                        autoindex: false,
                    },
                ],
            }],
        };
        Cfg::build(raw).unwrap()
    }

    fn request(path: &str, method: Method) -> Request {
        Request {
            method,
            version: Version::Http11,
            path: path.to_string(),
            query: String::new(),
            host: "_".to_string(),
            header: HeaderMap::new(),
            content: Vec::new(),
            keep_alive: true,
        }
    }

    #[test]
    fn static_get_composes_success_path() {
        let cfg = build_config();
        let req = request("/foo.html", Method::Get);
        let decision = route(&req, &cfg, &endpoint());
        assert!(!decision.is_cgi);
        assert_eq!(decision.status, 200);
        assert_eq!(decision.success_path, "./www/foo.html");
    }

    #[test]
    fn directory_root_appends_index() {
        let cfg = build_config();
        let req = request("/", Method::Get);
        let decision = route(&req, &cfg, &endpoint());
        assert_eq!(decision.success_path, "./www/index.html");
    }

    #[test]
    fn disallowed_method_is_405_but_reports_methods() {
        let cfg = build_config();
        let req = request("/foo.html", Method::Post);
        let decision = route(&req, &cfg, &endpoint());
        assert_eq!(decision.status, 405);
        assert!(decision.methods.contains(Method::Get));
    }

    #[test]
    fn unmatched_prefix_is_404() {
        let cfg = build_config();
        let req = request("/nowhere/x", Method::Get);
        let decision = route(&req, &cfg, &endpoint());
        assert_eq!(decision.status, 404);
    }

    #[test]
    fn cgi_extension_wins_over_prefix_match() {
        let cfg = build_config();
        let req = request("/run.php/extra", Method::Get);
        let decision = route(&req, &cfg, &endpoint());
        assert!(decision.is_cgi);
        assert_eq!(decision.success_path, "./www/cgi-bin/run.php");
        let env = decision.cgi_env.unwrap();
        let path_info = env.iter().find(|(k, _)| k == "PATH_INFO").unwrap();
        assert_eq!(path_info.1, "/extra");
    }

    #[test]
    fn body_over_limit_is_413() {
        let cfg = build_config();
        let mut req = request("/up", Method::Post);
        req.content = vec![0u8; 2048];
        let decision = route(&req, &cfg, &endpoint());
        assert_eq!(decision.status, 413);
    }
}
