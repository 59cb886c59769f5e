use std::net::{IpAddr, Ipv4Addr};

use brilliant_server::config::{Endpoint, RawConfig, RawRoute, RawServer, ServerConfig};
use brilliant_server::http::{HeaderMap, Method, Version};
use brilliant_server::http::Request;
use brilliant_server::router;

fn endpoint() -> Endpoint {
    Endpoint { host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port: 9000 }
}

fn cgi_config() -> ServerConfig {
    let raw = RawConfig {
        servers: vec![RawServer {
            host: "127.0.0.1".to_string(),
            ports: vec![9000],
            server_name: "_".to_string(),
            default_server: true,
            error_page: None,
            client_max_body_size: 1 << 20,
            routes: vec![RawRoute {
                path: String::new(),
                methods: vec!["GET".to_string(), "POST".to_string()],
                redirection: None,
                root: "/cgi-bin".to_string(),
                index: String::new(),
                upload_path: None,
                cgi_ext: Some(".php".to_string()),
                autoindex: false,
            }],
        }],
    };
    ServerConfig::build(raw).unwrap()
}

fn request(path: &str, query: &str, method: Method, body: Vec<u8>) -> Request {
    let mut header = HeaderMap::new();
    header.push("content-type".to_string(), "text/plain".to_string());
    Request {
        method,
        version: Version::Http11,
        path: path.to_string(),
        query: query.to_string(),
        host: "_".to_string(),
        header,
        content: body,
        keep_alive: true,
    }
}

// I7: the env vector emitted has exactly 17 entries in the documented order.
#[test]
fn cgi_env_has_exactly_seventeen_entries() {
    let cfg = cgi_config();
    let req = request("/run.php", "", Method::Get, Vec::new());
    let decision = router::route(&req, &cfg, &endpoint());

    assert!(decision.is_cgi);
    let env = decision.cgi_env.expect("cgi route must populate an env vector");
    assert_eq!(env.len(), 17);

    let names: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "AUTH_TYPE",
            "CONTENT_LENGTH",
            "CONTENT_TYPE",
            "GATEWAY_INTERFACE",
            "PATH_INFO",
            "PATH_TRANSLATED",
            "QUERY_STRING",
            "REMOTE_ADDR",
            "REMOTE_HOST",
            "REMOTE_IDENT",
            "REMOTE_USER",
            "REQUEST_METHOD",
            "SCRIPT_NAME",
            "SERVER_NAME",
            "SERVER_PORT",
            "SERVER_PROTOCOL",
            "SERVER_SOFTWARE",
        ]
    );
}

#[test]
fn content_length_reflects_dechunked_body() {
    let cfg = cgi_config();
    let req = request("/run.php", "", Method::Post, b"hello".to_vec());
    let decision = router::route(&req, &cfg, &endpoint());
    let env = decision.cgi_env.unwrap();
    let content_length = env.iter().find(|(k, _)| k == "CONTENT_LENGTH").unwrap();
    assert_eq!(content_length.1, "5");
}

#[test]
fn argv_carries_decoded_positional_args_when_query_has_no_equals() {
    let cfg = cgi_config();
    let req = request("/run.php", "?a+b%20c", Method::Get, Vec::new());
    let decision = router::route(&req, &cfg, &endpoint());
    let argv = decision.cgi_argv.unwrap();
    assert_eq!(argv, vec!["./cgi-bin/run.php".to_string(), "a".to_string(), "b c".to_string()]);
}

#[test]
fn argv_is_just_the_script_when_query_has_an_equals_sign() {
    let cfg = cgi_config();
    let req = request("/run.php", "?key=value", Method::Get, Vec::new());
    let decision = router::route(&req, &cfg, &endpoint());
    let argv = decision.cgi_argv.unwrap();
    assert_eq!(argv.len(), 1);
}
