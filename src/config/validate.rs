//! Cross-field validation over the raw, not-yet-built server list: duplicate
//! `host:port:server_name` triples, wildcard-vs-specific bind conflicts, and
//! dangling filesystem references. Conflicting blocks are dropped rather
//! than aborting the whole load, matching the teacher's forgiving startup.

use std::collections::{HashMap, HashSet};

use crate::config::raw::RawServer;

pub fn validate_configs(configs: Vec<RawServer>) -> Vec<RawServer> {
    let mut conflict_indices = HashSet::new();

    let mut usage_map: HashMap<(String, u16, String), Vec<usize>> = HashMap::new();
    for (idx, config) in configs.iter().enumerate() {
        for port in &config.ports {
            let key = (config.host.clone(), *port, config.server_name.clone());
            usage_map.entry(key).or_default().push(idx);
        }
    }
    for ((host, port, server_name), indices) in usage_map {
        if indices.len() > 1 {
            server_log::warn!(
                "multiple servers defined for {}:{} with name '{}', dropping conflicting configurations",
                host, port, server_name
            );
            conflict_indices.extend(indices);
        }
    }

    let mut port_hosts: HashMap<u16, HashSet<String>> = HashMap::new();
    for config in &configs {
        for port in &config.ports {
            port_hosts.entry(*port).or_default().insert(config.host.clone());
        }
    }
    for (port, hosts) in port_hosts {
        if hosts.contains("0.0.0.0") && hosts.len() > 1 {
            server_log::warn!(
                "port {} mixes wildcard '0.0.0.0' with specific hosts {:?}, dropping all",
                port, hosts
            );
            for (idx, config) in configs.iter().enumerate() {
                if config.ports.contains(&port) {
                    conflict_indices.insert(idx);
                }
            }
        }
    }

    for (idx, config) in configs.iter().enumerate() {
        let mut valid = true;

        if let Some(path) = &config.error_page {
            if let Err(e) = std::fs::File::open(path) {
                server_log::warn!(
                    "server '{}' error page '{}' is unreadable: {}",
                    config.server_name, path, e
                );
                valid = false;
            }
        }

        for route in &config.routes {
            if let Err(e) = std::fs::read_dir(&route.root) {
                server_log::warn!(
                    "server '{}' route '{}' root '{}' is not a readable directory: {}",
                    config.server_name, route.path, route.root, e
                );
                valid = false;
            }
        }

        if !valid {
            conflict_indices.insert(idx);
        }
    }

    let dropped = conflict_indices.len();
    let valid_configs: Vec<RawServer> = configs
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !conflict_indices.contains(idx))
        .map(|(_, c)| c)
        .collect();

    if dropped > 0 {
        server_log::warn!("{} server block(s) dropped due to conflicts", dropped);
    }

    valid_configs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(host: &str, ports: Vec<u16>, name: &str) -> RawServer {
        RawServer {
            host: host.to_string(),
            ports,
            server_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn no_conflicts_keeps_both() {
        let configs = vec![
            make_config("127.0.0.1", vec![8001], "s1"),
            make_config("127.0.0.1", vec![8002], "s2"),
        ];
        assert_eq!(validate_configs(configs).len(), 2);
    }

    #[test]
    fn virtual_hosts_on_same_endpoint_are_fine() {
        let configs = vec![
            make_config("127.0.0.1", vec![8080], "example.com"),
            make_config("127.0.0.1", vec![8080], "api.example.com"),
        ];
        assert_eq!(validate_configs(configs).len(), 2);
    }

    #[test]
    fn duplicate_triple_drops_both() {
        let configs = vec![
            make_config("127.0.0.1", vec![8080], "same.com"),
            make_config("127.0.0.1", vec![8080], "same.com"),
            make_config("127.0.0.1", vec![8081], "other.com"),
        ];
        let valid = validate_configs(configs);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].server_name, "other.com");
    }

    #[test]
    fn wildcard_and_specific_host_conflict() {
        let configs = vec![
            make_config("0.0.0.0", vec![8080], "s1"),
            make_config("127.0.0.1", vec![8080], "s2"),
        ];
        assert_eq!(validate_configs(configs).len(), 0);
    }

    #[test]
    fn wildcard_with_distinct_names_is_fine() {
        let configs = vec![
            make_config("0.0.0.0", vec![8080], "s1"),
            make_config("0.0.0.0", vec![8080], "s2"),
        ];
        assert_eq!(validate_configs(configs).len(), 2);
    }

    #[test]
    fn missing_error_page_drops_config() {
        let mut config = make_config("127.0.0.1", vec![8080], "s1");
        config.error_page = Some("/non/existent/err.html".to_string());
        assert_eq!(validate_configs(vec![config]).len(), 0);
    }

    #[test]
    fn missing_root_drops_config() {
        use crate::config::raw::RawRoute;
        let mut config = make_config("127.0.0.1", vec![8080], "s1");
        config.routes.push(RawRoute {
            root: "/non/existent/dir".to_string(),
            ..Default::default()
        });
        assert_eq!(validate_configs(vec![config]).len(), 0);
    }

    #[test]
    fn valid_files_are_kept() {
        use crate::config::raw::RawRoute;
        let temp_dir = std::env::temp_dir();
        let file_path = temp_dir.join("brilliant_server_test_err.html");
        std::fs::write(&file_path, "error").unwrap();

        let mut config = make_config("127.0.0.1", vec![8080], "s1");
        config.error_page = Some(file_path.to_str().unwrap().to_string());
        config.routes.push(RawRoute {
            root: temp_dir.to_str().unwrap().to_string(),
            ..Default::default()
        });

        assert_eq!(validate_configs(vec![config]).len(), 1);
        let _ = std::fs::remove_file(file_path);
    }
}
