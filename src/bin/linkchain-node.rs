#![forbid(unsafe_code)]
//! LinkChain node: serves the ledger over HTTP and reconciles with peers.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use linkchain::api::run_api_server;
use linkchain::config::{load_config, DEFAULT_CONFIG_PATH};
use linkchain::node::Node;

#[derive(Parser, Debug)]
#[command(name = "linkchain-node")]
#[command(about = "Run a LinkChain ledger node")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Port for the HTTP API (overrides network.api_port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Additional peer to register at startup; may be repeated
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Node identifier credited with mining rewards (overrides miner.node_id)
    #[arg(long)]
    node_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(port) = args.port {
        config.network.api_port = port;
    }
    if let Some(node_id) = args.node_id {
        config.miner.node_id = node_id;
    }
    config.network.bootstrap_peers.extend(args.peers);

    let addr: SocketAddr = format!("{}:{}", config.network.bind_address, config.network.api_port)
        .parse()
        .map_err(|e| format!("invalid bind address: {}", e))?;
    let resolve_interval = config.consensus.resolve_interval();

    let node = Arc::new(Node::from_config(config)?);
    info!(
        node_id = node.node_id(),
        difficulty_target = node.difficulty().target(),
        peers = node.peers().len(),
        "starting LinkChain node"
    );

    let _resolver_task = resolve_interval.map(|interval| {
        info!(interval_secs = interval.as_secs(), "periodic resolution enabled");
        node.clone().spawn_periodic_resolver(interval)
    });

    run_api_server(node, addr).await?;
    Ok(())
}
