use std::fs;
use std::net::{IpAddr, Ipv4Addr};

use brilliant_server::config::{Endpoint, RawConfig, RawRoute, RawServer, ServerConfig};
use brilliant_server::http::{Parser, Step};
use brilliant_server::producer::{Producer, StaticProducer};
use brilliant_server::router;

fn endpoint() -> Endpoint {
    Endpoint { host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port: 8080 }
}

fn build_config(root: &str, index: &str) -> ServerConfig {
    let raw = RawConfig {
        servers: vec![RawServer {
            host: "127.0.0.1".to_string(),
            ports: vec![8080],
            server_name: "_".to_string(),
            default_server: true,
            error_page: None,
            client_max_body_size: 1 << 20,
            routes: vec![RawRoute {
                path: "/".to_string(),
                methods: vec!["GET".to_string(), "DELETE".to_string()],
                redirection: None,
                root: root.to_string(),
                index: index.to_string(),
                upload_path: None,
                cgi_ext: None,
                autoindex: true,
            }],
        }],
    };
    ServerConfig::build(raw).unwrap()
}

#[test]
fn parses_and_routes_a_simple_get() {
    let dir = std::env::temp_dir().join("brilliant_server_test_simple_get");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("hello.html"), b"<p>hi</p>").unwrap();

    let cfg = build_config(dir.to_str().unwrap(), "index.html");
    let raw = b"GET /hello.html HTTP/1.1\r\nHost: _\r\n\r\n";

    let mut parser = Parser::new();
    parser.feed(raw);
    assert_eq!(parser.advance(), Step::Complete);
    let request = parser.take_request();

    let decision = router::route(&request, &cfg, &endpoint());
    assert_eq!(decision.status, 200);

    let mut producer = StaticProducer::new(&decision, &request);
    while !producer.execute() {}
    let (meta, body) = producer.into_result();
    assert_eq!(meta.status, 200);
    assert_eq!(body, b"<p>hi</p>");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn autoindex_lists_entries_in_sorted_order() {
    let dir = std::env::temp_dir().join("brilliant_server_test_autoindex");
    fs::create_dir_all(dir.join("b_dir")).unwrap();
    fs::create_dir_all(dir.join("a_dir")).unwrap();
    fs::write(dir.join("z_file.txt"), b"z").unwrap();

    let cfg = build_config(dir.to_str().unwrap(), "");
    let raw = b"GET / HTTP/1.1\r\nHost: _\r\n\r\n";

    let mut parser = Parser::new();
    parser.feed(raw);
    assert_eq!(parser.advance(), Step::Complete);
    let request = parser.take_request();

    let decision = router::route(&request, &cfg, &endpoint());
    let mut producer = StaticProducer::new(&decision, &request);
    while !producer.execute() {}
    let (meta, body) = producer.into_result();

    assert_eq!(meta.status, 200);
    let html = String::from_utf8(body).unwrap();
    let a_pos = html.find("a_dir").unwrap();
    let b_pos = html.find("b_dir").unwrap();
    let z_pos = html.find("z_file.txt").unwrap();
    assert!(a_pos < b_pos && b_pos < z_pos);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn pipelined_requests_are_both_parsed_in_order() {
    let raw = b"GET /one HTTP/1.1\r\nHost: h\r\n\r\nGET /two HTTP/1.1\r\nHost: h\r\n\r\n";
    let mut parser = Parser::new();
    parser.feed(raw);

    assert_eq!(parser.advance(), Step::Complete);
    let first = parser.take_request();
    assert_eq!(first.path, "/one");
    assert!(parser.has_pipelined_tail());

    assert_eq!(parser.advance(), Step::Complete);
    let second = parser.take_request();
    assert_eq!(second.path, "/two");
    assert!(!parser.has_pipelined_tail());
}

#[test]
fn delete_producer_removes_the_file() {
    let dir = std::env::temp_dir().join("brilliant_server_test_delete");
    fs::create_dir_all(&dir).unwrap();
    let target = dir.join("doomed.txt");
    fs::write(&target, b"bye").unwrap();

    let cfg = build_config(dir.to_str().unwrap(), "index.html");
    let raw = b"DELETE /doomed.txt HTTP/1.1\r\nHost: _\r\n\r\n";
    let mut parser = Parser::new();
    parser.feed(raw);
    assert_eq!(parser.advance(), Step::Complete);
    let request = parser.take_request();

    let decision = router::route(&request, &cfg, &endpoint());
    assert_eq!(decision.status, 200);
    let mut producer = Producer::Static(StaticProducer::new(&decision, &request));
    while !producer.execute() {}
    let (meta, _) = producer.into_result();
    assert_eq!(meta.status, 200);
    assert!(!target.exists());

    fs::remove_dir_all(&dir).ok();
}
