//! CLI and config handling.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "data/indexer.sqlite";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Chain indexer configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "chain-indexer", about = "Chain indexer v0.1")]
pub struct IndexerConfig {
    /// Node JSON-RPC endpoint, e.g. http://127.0.0.1:7777/rpc.
    #[arg(long, env = "RPC_URL", value_parser = parse_rpc_url)]
    pub rpc: Option<String>,
    /// Items dispatched between settle barriers and rows per batch flush.
    #[arg(long, env = "LIMIT_BULK_INSERT", default_value_t = 10_000)]
    pub limit_bulk_insert: usize,
    /// Upper bound (ms) of the random delay before each dispatch.
    #[arg(long, env = "BASE_RANDOM_THROTTLE_NUMBER", default_value_t = 3)]
    pub base_random_throttle_number: u64,
    /// Seconds between sync cycles; absent or 0 runs a single cycle.
    #[arg(long = "loop", env = "LOOP")]
    pub loop_secs: Option<u64>,
    /// SQLite database file.
    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,
    /// Per-request deadline for node calls.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,
    /// Increase logging verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
    /// Disable progress bars.
    #[arg(long)]
    pub no_progress: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print stored counts and per-type deploy stats for the last 14 days as JSON.
    Stats,
}

impl IndexerConfig {
    /// Parse configuration from CLI args.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Repeat interval, when continuous mode is on.
    pub fn loop_interval(&self) -> Option<std::time::Duration> {
        self.loop_secs
            .filter(|secs| *secs > 0)
            .map(std::time::Duration::from_secs)
    }
}

fn parse_rpc_url(raw: &str) -> Result<String, String> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Ok(raw.to_string())
    } else {
        Err(format!(
            "RPC url incorrect, expected http(s)://[url] pointing at the node's rpc endpoint: {raw}"
        ))
    }
}
