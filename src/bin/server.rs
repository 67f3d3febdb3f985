//! EmberKV Server Binary
//!
//! Starts the TCP server for EmberKV.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use emberkv::network::Server;
use emberkv::{Config, Engine};

/// EmberKV Server
#[derive(Parser, Debug)]
#[command(name = "emberkv-server")]
#[command(about = "Redis-wire-compatible key-value store with an LSM engine")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./emberkv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short = 'c', long, default_value = "1024")]
    max_connections: usize,

    /// MemTable size limit in KiB before flush
    #[arg(short = 'm', long, default_value = "4096")]
    memtable_kib: usize,

    /// Number of SSTables that triggers compaction
    #[arg(short = 't', long, default_value = "5")]
    compaction_threshold: usize,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,emberkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("EmberKV Server v{}", emberkv::VERSION);
    tracing::info!("data directory: {}", args.data_dir);
    tracing::info!("listen address: {}", args.listen);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .memtable_size_limit(args.memtable_kib * 1024)
        .compaction_threshold(args.compaction_threshold)
        .build();

    let engine = match Engine::open(config.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!("failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("engine initialized");

    let server = Server::new(config, Arc::clone(&engine));

    // SIGINT/SIGTERM stop the accept loop; run() then drains the open
    // sessions and returns, so the engine can close and checkpoint its
    // WAL below.
    let shutdown = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || shutdown.shutdown()) {
        tracing::warn!("failed to install signal handler: {}", e);
    }

    if let Err(e) = server.run() {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = engine.close() {
        tracing::error!("engine close failed: {}", e);
        std::process::exit(1);
    }

    tracing::info!("server stopped");
}
