//! RadishKV Server Binary
//!
//! Starts the TCP server for RadishKV.

use std::time::Duration;

use clap::Parser;
use radishkv::config::{ServerConfig, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT};
use radishkv::Server;
use tracing_subscriber::{fmt, EnvFilter};

/// RadishKV Server
#[derive(Parser, Debug)]
#[command(name = "radishkv-server")]
#[command(about = "Minimal Redis-style in-memory key-value store")]
#[command(version)]
struct Args {
    /// Interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// TCP port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Largest accepted frame, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Close connections idle for this many seconds (0 = never)
    #[arg(short, long, default_value = "0")]
    idle_timeout: u64,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,radishkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("RadishKV Server v{}", radishkv::VERSION);

    let idle_timeout = (args.idle_timeout > 0).then(|| Duration::from_secs(args.idle_timeout));
    let config = ServerConfig::builder()
        .host(&args.host)
        .port(args.port)
        .max_frame_size(args.max_frame_size)
        .idle_timeout(idle_timeout)
        .max_connections(args.max_connections)
        .build();

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
