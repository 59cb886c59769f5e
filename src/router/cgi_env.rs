//! CGI/1.1 meta-variable construction (§4.3.1).

use crate::config::{Endpoint, Location};
use crate::http::Request;

const SERVER_SOFTWARE: &str = "BrilliantServer/1.0";

/// Build the 17-entry environment vector, in the documented order.
///
/// `script_name_tail` is the request path up to and including the matched
/// extension; `path_info` is everything after it.
pub fn build_env(
    request: &Request,
    location: &Location,
    endpoint: &Endpoint,
    script_name_tail: &str,
    path_info: &str,
) -> Vec<(String, String)> {
    let path_translated = if path_info.is_empty() {
        String::new()
    } else {
        join_under_cwd(&location.root, path_info)
    };

    vec![
        ("AUTH_TYPE".to_string(), String::new()),
        ("CONTENT_LENGTH".to_string(), request.content.len().to_string()),
        (
            "CONTENT_TYPE".to_string(),
            request.header.get_first("content-type").unwrap_or("").to_string(),
        ),
        ("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string()),
        ("PATH_INFO".to_string(), path_info.to_string()),
        ("PATH_TRANSLATED".to_string(), path_translated),
        ("QUERY_STRING".to_string(), request.query.trim_start_matches('?').to_string()),
        ("REMOTE_ADDR".to_string(), endpoint.host.to_string()),
        ("REMOTE_HOST".to_string(), endpoint.host.to_string()),
        ("REMOTE_IDENT".to_string(), String::new()),
        ("REMOTE_USER".to_string(), String::new()),
        ("REQUEST_METHOD".to_string(), request.method.to_string()),
        ("SCRIPT_NAME".to_string(), format!("{}{}", location.root, script_name_tail)),
        ("SERVER_NAME".to_string(), request.host.clone()),
        ("SERVER_PORT".to_string(), endpoint.port.to_string()),
        ("SERVER_PROTOCOL".to_string(), request.version.to_string()),
        ("SERVER_SOFTWARE".to_string(), SERVER_SOFTWARE.to_string()),
    ]
}

/// The source computes `PATH_TRANSLATED` from the server *binary's*
/// directory rather than the process's current working directory; a
/// faithful port must reproduce this or CGI test fixtures that assume a
/// fixed launch directory will fail (documented Open Question, §7).
fn join_under_cwd(root: &str, path_info: &str) -> String {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_default();
    format!("{}{}{}", exe_dir.display(), root, path_info)
}

/// CGI script argv (RFC 3875 §4.4): when the query has no `=`, split it on
/// `+` and percent-decode each token as a positional argument.
pub fn build_argv(success_path: &str, query: &str) -> Vec<String> {
    let mut argv = vec![success_path.to_string()];
    let raw = query.trim_start_matches('?');
    if raw.is_empty() || raw.contains('=') {
        return argv;
    }
    for token in raw.split('+') {
        argv.push(crate::uri::decode_path(token).unwrap_or_else(|| token.to_string()));
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Location, Methods};
    use crate::http::{HeaderMap, Method, Version};
    use std::net::{IpAddr, Ipv4Addr};

    fn sample_request() -> Request {
        Request {
            method: Method::Get,
            version: Version::Http11,
            path: "/cgi-bin/test.php/extra".to_string(),
            query: "?a=1".to_string(),
            host: "example.com".to_string(),
            header: HeaderMap::new(),
            content: Vec::new(),
            keep_alive: true,
        }
    }

    fn sample_location() -> Location {
        Location {
            error: false,
            autoindex: false,
            methods: Methods::GET,
            body_max: 1024,
            root: "/www/cgi-bin".to_string(),
            index: "index.html".to_string(),
            upload_path: None,
            redirect_to: None,
        }
    }

    #[test]
    fn builds_seventeen_entries_in_order() {
        let req = sample_request();
        let loc = sample_location();
        let endpoint = Endpoint { host: IpAddr::V4(Ipv4Addr::LOCALHOST), port: 8080 };
        let env = build_env(&req, &loc, &endpoint, "/cgi-bin/test.php", "/extra");
        assert_eq!(env.len(), 17);
        assert_eq!(env[0].0, "AUTH_TYPE");
        assert_eq!(env[4], ("PATH_INFO".to_string(), "/extra".to_string()));
        assert_eq!(env[16], ("SERVER_SOFTWARE".to_string(), SERVER_SOFTWARE.to_string()));
    }

    #[test]
    fn argv_splits_on_plus_when_no_equals() {
        let argv = build_argv("/www/cgi-bin/test.php", "?a+b+c");
        assert_eq!(argv, vec!["/www/cgi-bin/test.php", "a", "b", "c"]);
    }

    #[test]
    fn argv_empty_when_query_has_equals() {
        let argv = build_argv("/www/cgi-bin/test.php", "?a=1");
        assert_eq!(argv, vec!["/www/cgi-bin/test.php"]);
    }
}
