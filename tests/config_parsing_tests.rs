use brilliant_server::config::{FromYaml, RawConfig};

#[test]
fn parses_minimal_server_block() {
    let yaml = r#"
servers:
  - host: "127.0.0.1"
    ports: [8080, 8081]
    server_name: "test_server"
    default_server: true
    client_max_body_size: 1024
    routes:
      - path: "/"
        methods: ["GET"]
        root: "./www"
        index: "index.html"
        autoindex: true
"#;
    let config = RawConfig::from_str(yaml).expect("should parse a valid config");
    assert_eq!(config.servers.len(), 1);
    let server = &config.servers[0];
    assert_eq!(server.host, "127.0.0.1");
    assert_eq!(server.ports, vec![8080, 8081]);
    assert_eq!(server.server_name, "test_server");
    assert!(server.default_server);
    assert_eq!(server.client_max_body_size, 1024);
    assert_eq!(server.routes[0].path, "/");
    assert!(server.routes[0].autoindex);
}

#[test]
fn parses_multiple_servers_and_cgi_route() {
    let yaml = r#"
servers:
  - server_name: web1
    host: 127.0.0.1
    ports: [8080]
    routes:
      - path: /
        root: ./web1/www
      - path: /cgi-bin
        cgi_ext: ".php"
        root: ./web1/cgi-bin
  - server_name: web2
    host: 127.0.0.1
    ports: [9090]
    routes:
      - path: /
        root: ./web2/www
"#;
    let config = RawConfig::from_str(yaml).unwrap();
    assert_eq!(config.servers.len(), 2);
    assert_eq!(config.servers[0].server_name, "web1");
    assert_eq!(config.servers[0].routes[1].cgi_ext.as_deref(), Some(".php"));
    assert_eq!(config.servers[1].ports, vec![9090]);
}

#[test]
fn rejects_bad_syntax() {
    let yaml = "host: : 127.0.0.1";
    assert!(RawConfig::from_str(yaml).is_err());
}

#[test]
fn error_reports_line_and_column() {
    let yaml = r#"
servers:
  - host "missing colon"
"#;
    let err = RawConfig::from_str(yaml).unwrap_err();
    assert!(err.loc.is_some());
}

#[test]
fn builds_runtime_config_from_parsed_tree() {
    let raw = RawConfig::from_str(
        r#"
servers:
  - host: "127.0.0.1"
    ports: [8080]
    server_name: "_"
    default_server: true
    client_max_body_size: 4096
    routes:
      - path: "/"
        methods: ["GET", "POST"]
        root: "./www"
        index: "index.html"
"#,
    )
    .unwrap();

    let built = brilliant_server::config::ServerConfig::build(raw).unwrap();
    assert_eq!(built.endpoints.len(), 1);
}
