//! Entry point (§10.5). Reads the config path from `argv[1]` (default
//! `config.yaml`), loads and validates it, and runs the reactor to
//! completion.

use std::path::PathBuf;
use std::sync::Arc;

use brilliant_server::{config, reactor::Server};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

fn main() {
    if let Err(e) = run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> brilliant_server::error::Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = config::load(&path)?;
    server_log::info!("configuration loaded from {}", path.display());

    let mut server = Server::new(Arc::new(config))?;
    server.run()
}
