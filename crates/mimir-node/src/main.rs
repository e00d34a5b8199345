use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use mimir_replication::FollowerController;
use mimir_server::{serve_replication, ShardRegistry};
use mimir_storage::{FjallKvFactory, FjallStore, FjallWal};

#[derive(clap::Parser, Debug)]
#[command(name = "mimir-node", about = "Mimir replicated KV follower node")]
struct Cli {
    #[arg(long)]
    node_id: u64,
    /// Overrides server.listen_addr from the config.
    #[arg(long)]
    listen_addr: Option<String>,
    /// Shard ids hosted by this node, repeatable. Defaults to shard 0.
    #[arg(long = "shard")]
    shards: Vec<u32>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides storage.data_dir from the config.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct StorageConfig {
    data_dir: String,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    listen_addr: String,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    log_level: String,
    log_format: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    storage: StorageConfig,
    server: ServerConfig,
    observability: ObservabilityConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();

    let mut figment = Figment::new()
        .merge(Toml::string(include_str!("../../../config/default.toml")));

    if let Some(ref config_path) = cli.config {
        figment = figment.merge(Toml::file_exact(config_path));
    }

    let config: Config = figment
        .merge(Env::prefixed("MIMIR_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    match config.observability.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(config.observability.log_level.as_str())
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(config.observability.log_level.as_str())
                .init();
        }
    }

    let listen = cli
        .listen_addr
        .clone()
        .unwrap_or_else(|| config.server.listen_addr.clone());
    let listen_addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen_addr: {listen}"))?;

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.storage.data_dir));

    let shards = if cli.shards.is_empty() { vec![0] } else { cli.shards.clone() };

    tracing::info!(
        node_id = cli.node_id,
        listen_addr = %listen_addr,
        shards = ?shards,
        data_dir = %data_dir.display(),
        "node starting"
    );

    let store = FjallStore::open(&data_dir).context("failed to open storage")?;
    let kv_factory = FjallKvFactory::new(store.clone());

    let mut registry = ShardRegistry::new();
    for shard_id in shards {
        let wal = FjallWal::new(store.clone(), shard_id);
        let controller = FollowerController::new(shard_id, wal, &kv_factory)
            .await
            .with_context(|| format!("failed to start follower for shard {shard_id}"))?;
        registry.insert(controller);
    }

    serve_replication(listen_addr, Arc::new(registry)).await
}
