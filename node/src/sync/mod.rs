//! Block and deploy synchronization.

mod accumulator;
mod blocks;
mod deploys;
mod progress;
mod retry;
mod window;

pub use accumulator::RowAccumulator;
pub use blocks::BlockSyncEngine;
pub use deploys::{DeploySyncEngine, PendingDeploys};
pub use progress::{ItemOutcome, Phase, ProgressEvent, ProgressHandle};
pub use retry::{throttle, with_timeout, RetryPolicy};
pub use window::DispatchWindow;

use crate::{
    chain::{ChainClient, FetchError},
    cli::IndexerConfig,
    storage::Store,
};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_LIMIT_BULK_INSERT: usize = 10_000;
pub const DEFAULT_BASE_RANDOM_THROTTLE_NUMBER: u64 = 3;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables shared by both engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Items dispatched between settle barriers (and rows per flush).
    pub limit_bulk_insert: usize,
    /// Upper bound in milliseconds of the jitter before each dispatch.
    pub base_random_throttle_number: u64,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            limit_bulk_insert: DEFAULT_LIMIT_BULK_INSERT,
            base_random_throttle_number: DEFAULT_BASE_RANDOM_THROTTLE_NUMBER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&IndexerConfig> for SyncConfig {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            limit_bulk_insert: config.limit_bulk_insert.max(1),
            base_random_throttle_number: config.base_random_throttle_number,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Remote failure that outlived its retries.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Persistence failure; aborts the cycle.
    #[error("store error: {0:#}")]
    Store(eyre::Report),
}

/// Summary of one `parse_all_blocks` cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub backfilled: usize,
    pub start: u64,
    pub head: u64,
    pub up_to_date: bool,
    pub validated: usize,
}

/// Wires one cycle's engines around fresh accumulators.
pub fn build_engines(
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    config: SyncConfig,
    progress: ProgressHandle,
) -> Arc<BlockSyncEngine> {
    let deploys = Arc::new(DeploySyncEngine::new(
        Arc::clone(&client),
        Arc::clone(&store),
        config,
        progress.clone(),
    ));
    Arc::new(BlockSyncEngine::new(client, store, deploys, config, progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn sync_config_from_cli() {
        let cli = IndexerConfig::parse_from([
            "chain-indexer",
            "--rpc",
            "http://127.0.0.1:7777/rpc",
            "--limit-bulk-insert",
            "0",
            "--base-random-throttle-number",
            "7",
            "--request-timeout-ms",
            "2500",
        ]);
        let config = SyncConfig::from(&cli);
        assert_eq!(config.limit_bulk_insert, 1);
        assert_eq!(config.base_random_throttle_number, 7);
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
