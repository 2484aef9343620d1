//! ThreatSieve Server Binary
//!
//! Opens the indicator store, builds the membership index and serves lookups
//! over TCP.

use std::sync::Arc;

use clap::Parser;
use threatsieve::network::Server;
use threatsieve::refresh::IndexRefresher;
use threatsieve::{Config, Resolver, TableStore};
use tracing_subscriber::{fmt, EnvFilter};

/// ThreatSieve Server
#[derive(Parser, Debug)]
#[command(name = "threatsieve-server")]
#[command(about = "Threat indicator lookup service with a Bloom-filter pre-check")]
#[command(version)]
struct Args {
    /// Data directory holding indicator tables
    #[arg(short, long, default_value = "./threatsieve_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Maximum concurrent client connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Expected number of indicators (filter sizing)
    #[arg(short = 'n', long, default_value = "2000000")]
    expected_count: u64,

    /// Target false-positive rate of the filter
    #[arg(short = 'p', long, default_value = "0.01")]
    false_positive_rate: f64,

    /// Maximum open store sessions
    #[arg(long, default_value = "100")]
    max_open_conns: usize,

    /// Maximum idle store sessions
    #[arg(long, default_value = "10")]
    max_idle_conns: usize,

    /// Per-lookup store deadline in milliseconds (0 = none)
    #[arg(long, default_value = "0")]
    lookup_timeout_ms: u64,

    /// Rebuild the index when the store changes, checked every N seconds (0 = never)
    #[arg(long, default_value = "0")]
    refresh_secs: u64,

    /// Abort index builds on unreadable rows instead of skipping them
    #[arg(long)]
    strict: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,threatsieve=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("ThreatSieve Server v{}", threatsieve::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .expected_count(args.expected_count)
        .false_positive_rate(args.false_positive_rate)
        .max_open_connections(args.max_open_conns)
        .max_idle_connections(args.max_idle_conns)
        .lookup_timeout_ms(args.lookup_timeout_ms)
        .refresh_interval_secs(args.refresh_secs)
        .skip_malformed_rows(!args.strict)
        .build();

    // Open store
    let store = match TableStore::open_with_config(&config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to open indicator store: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        tables = store.table_count(),
        entries = store.entry_count(),
        "Indicator store opened"
    );

    // Build the initial index before accepting lookups
    let resolver = match Resolver::open(config.clone(), store) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            tracing::error!("Failed to build membership index: {}", e);
            std::process::exit(1);
        }
    };

    let _refresher = match config.refresh_interval() {
        Some(interval) => match IndexRefresher::spawn(Arc::clone(&resolver), interval) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::error!("Failed to start index refresher: {}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    // Start server
    let mut server = Server::new(config, resolver);
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
