//! Dual-protocol RPC gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────────┐
//!                          │                        GATEWAY                            │
//!                          │                                                           │
//!     Client (h2 / 1.1)    │  ┌─────────┐   ┌──────────┐   ┌────────────┐              │
//!     ─────────────────────┼─▶│   net   │──▶│   http   │──▶│ multiplex  │              │
//!                          │  │listener │   │connection│   │ (per req)  │              │
//!                          │  │  + TLS  │   └──────────┘   └─────┬──────┘              │
//!                          │  └─────────┘                        │                     │
//!                          │                  application/grpc   │   anything else     │
//!                          │                 ┌───────────────────┴──────────┐          │
//!                          │                 ▼                              ▼          │
//!                          │          ┌─────────────┐               ┌─────────────┐    │
//!                          │          │ rpc::native │               │   routing   │    │
//!                          │          └──────┬──────┘               │ mounts/trie │    │
//!                          │                 │                      └──────┬──────┘    │
//!                          │                 │                             ▼           │
//!                          │                 │                      ┌─────────────┐    │
//!                          │                 │                      │  translate  │    │
//!                          │                 │                      └──────┬──────┘    │
//!                          │                 ▼                             ▼           │
//!                          │          ┌──────────────────────────────────────────┐     │
//!                          │          │ RpcEngine (in-process | loopback dial)   │     │
//!                          │          └──────────────────────────────────────────┘     │
//!                          │                                                           │
//!                          │   config · observability (logs, metrics) · lifecycle      │
//!                          └──────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use rpc_gateway::config::{self, FileConfig};
use rpc_gateway::lifecycle::{spawn_signal_handler, Shutdown};
use rpc_gateway::observability::logging;
use rpc_gateway::services::pingpong;
use rpc_gateway::Gateway;

#[derive(Parser)]
#[command(name = "rpc-gateway")]
#[command(about = "Serve gRPC-style RPC and its REST translation on one TLS port", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (file_config, base) = match &cli.config {
        Some(path) => {
            let base = path.parent().map(PathBuf::from).unwrap_or_default();
            (config::load_config(path)?, base)
        }
        None => (FileConfig::default(), PathBuf::from(".")),
    };

    logging::init(&file_config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rpc-gateway starting");

    let gateway_config = config::read_gateway_config(file_config, &base)?;
    tracing::info!(config = ?gateway_config, "Configuration loaded");

    let gateway = Gateway::configure(gateway_config)?
        .register_rpc(pingpong::register)
        .handle(pingpong::REST_PREFIX, pingpong::rest_routes)
        .handle(pingpong::CUSTOM_PREFIX, pingpong::custom_routes)
        .build()?;

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    gateway.serve(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
