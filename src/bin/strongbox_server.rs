use std::{
    error::Error,
    net::SocketAddr,
    process,
    sync::{Arc, Mutex},
};

use clap::Parser;
use log::info;
use strongbox::{ItemStore, SecretServer, config::DEFAULT_WORKERS};

/// In-memory secret service speaking the strongbox protocol.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connection at address
    #[arg(default_value = "127.0.0.1:7370")]
    address: SocketAddr,
    /// Number of connections served concurrently
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    ctrlc::set_handler(|| {
        info!("shutting down");
        process::exit(0);
    })?;

    let store = Arc::new(Mutex::new(ItemStore::new()));
    let server = SecretServer::bind(cli.address, store, cli.workers.max(1))?;

    server.listen()?;
    Ok(())
}
