//! Pairlink Host
//!
//! Runs the Pairlink background context as a child process:
//!
//! 1. **Inbound**: the embedder writes one JSON object per line on stdin:
//!    envelopes from pages and the popup, messages received from paired
//!    peers, pairing requests, URL handshakes and popup open/close events.
//!
//! 2. **Outbound**: everything the bridge produces comes back as JSON lines
//!    on stdout: replies keyed by context id, encoded frames for peers, and
//!    envelopes for the popup.
//!
//! Logs go to stderr so they never mix with protocol lines.

mod handler;
mod protocol;
mod state;
#[cfg(test)]
mod test_support;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use pairlink_core::storage::{MemoryStorage, SqliteStorage, Storage};
use pairlink_core::BridgeConfig;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use state::Host;

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pairlink-host", version, about = "Pairlink background context over stdio")]
struct Args {
    /// SQLite database path. In-memory storage when unset.
    #[arg(long, env = "PAIRLINK_DB")]
    db: Option<String>,

    /// Name reported by the handshake action
    #[arg(long, default_value = "pairlink", env = "PAIRLINK_NAME")]
    name: String,

    /// Sender id stamped on responses
    #[arg(long, default_value = "pairlink", env = "PAIRLINK_SENDER_ID")]
    sender_id: String,

    /// Unanswered requests are dropped after this many seconds
    #[arg(long, default_value_t = 300, env = "PAIRLINK_REQUEST_TTL_SECS")]
    request_ttl_secs: u64,

    /// How often expired requests are swept, in seconds
    #[arg(long, default_value_t = 30, env = "PAIRLINK_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: u64,

    /// Background inbox capacity
    #[arg(long, default_value_t = 256, env = "PAIRLINK_INBOX_CAPACITY")]
    inbox_capacity: usize,

    /// Emit logs as JSON
    #[arg(long, env = "PAIRLINK_JSON_LOGS")]
    json_logs: bool,
}

impl Args {
    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            name: self.name.clone(),
            sender_id: self.sender_id.clone(),
            request_ttl_secs: self.request_ttl_secs,
            sweep_interval_secs: self.sweep_interval_secs,
            inbox_capacity: self.inbox_capacity,
            ..Default::default()
        }
    }

    fn open_storage(&self) -> pairlink_core::Result<Arc<dyn Storage>> {
        match &self.db {
            Some(path) => {
                tracing::info!(path = path.as_str(), "Using SQLite storage");
                Ok(Arc::new(SqliteStorage::open(Some(path))?))
            }
            None => {
                tracing::info!("Using in-memory storage");
                Ok(Arc::new(MemoryStorage::new()))
            }
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing (stderr; stdout carries the protocol)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pairlink_host=info,pairlink_core=info".into());
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let storage = match args.open_storage() {
        Ok(storage) => storage,
        Err(e) => {
            tracing::error!(code = e.code(), "Failed to open storage: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = handler::spawn_writer(out_rx, tokio::io::stdout());

    let host = match Host::start(args.bridge_config(), storage, out_tx).await {
        Ok(host) => host,
        Err(e) => {
            tracing::error!(code = e.code(), "Failed to start bridge: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        name = args.name.as_str(),
        "Pairlink host v{} ready",
        env!("CARGO_PKG_VERSION")
    );

    handler::run(host.state.clone(), BufReader::new(tokio::io::stdin())).await;

    let result = host.shutdown().await;
    writer.abort();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.code(), "Shutdown failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
