//! Sync cycle orchestration.

use crate::chain::{ChainClient, RpcChainClient};
use crate::cli::IndexerConfig;
use crate::storage::{SqliteStore, Store};
use crate::sync::{build_engines, ProgressHandle, SyncConfig, SyncOutcome};
use crate::ui::spawn_progress_reporter;
use eyre::{eyre, Result, WrapErr};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Run one cycle, or cycles every `--loop` seconds until ctrl-c.
pub async fn run_sync(config: IndexerConfig) -> Result<()> {
    let url = config.rpc.as_deref().ok_or_else(|| {
        eyre!("RPC_URL env variable is not set. You can also set the --rpc option.")
    })?;
    let sync_config = SyncConfig::from(&config);
    let client: Arc<dyn ChainClient> =
        Arc::new(RpcChainClient::new(url, sync_config.request_timeout)?);
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.db_path)
            .wrap_err_with(|| format!("failed to open {}", config.db_path.display()))?,
    );
    let draw_bars = !config.no_progress && std::io::stderr().is_terminal();

    info!(
        rpc = url,
        db_path = %config.db_path.display(),
        limit_bulk_insert = sync_config.limit_bulk_insert,
        base_random_throttle_number = sync_config.base_random_throttle_number,
        "starting chain indexer"
    );

    let Some(interval) = config.loop_interval() else {
        run_cycle(client, store, sync_config, draw_bars).await?;
        return Ok(());
    };

    info!(interval_secs = interval.as_secs(), "continuous mode");
    loop {
        if let Err(err) =
            run_cycle(Arc::clone(&client), Arc::clone(&store), sync_config, draw_bars).await
        {
            error!(error = %format!("{err:#}"), "sync cycle failed");
        }
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("shutdown signal received");
                break;
            }
        }
    }
    Ok(())
}

/// One full `parse_all_blocks` pass over fresh engines.
pub async fn run_cycle(
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    config: SyncConfig,
    draw_bars: bool,
) -> Result<SyncOutcome> {
    let started = Instant::now();
    let (progress, rx) = ProgressHandle::channel();
    let reporter = spawn_progress_reporter(rx, draw_bars);
    let engine = build_engines(client, store, config, progress);

    let result = engine.parse_all_blocks().await;
    // Dropping the engines closes the progress channel.
    drop(engine);
    if let Err(err) = reporter.await {
        warn!(error = %err, "progress reporter failed");
    }

    let outcome = result.wrap_err("sync cycle aborted")?;
    if outcome.up_to_date {
        info!(
            head = outcome.head,
            backfilled = outcome.backfilled,
            "indexer is up to date"
        );
    } else {
        info!(
            start = outcome.start,
            head = outcome.head,
            backfilled = outcome.backfilled,
            validated = outcome.validated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sync cycle finished"
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_sync_config, FixtureChain};
    use clap::Parser;

    #[tokio::test(start_paused = true)]
    async fn cycle_indexes_then_reports_up_to_date() {
        let chain = Arc::new(FixtureChain::with_empty_blocks(0..=5));
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));

        let first = run_cycle(chain.clone(), store.clone(), test_sync_config(), false)
            .await
            .expect("first cycle");
        assert_eq!(first.head, 5);
        assert!(!first.up_to_date);
        assert_eq!(store.counts().expect("counts").validated_blocks, 6);

        let second = run_cycle(chain, store, test_sync_config(), false)
            .await
            .expect("second cycle");
        assert!(second.up_to_date);
    }

    #[tokio::test]
    async fn missing_rpc_url_is_rejected() {
        let mut config = IndexerConfig::parse_from(["chain-indexer"]);
        // RPC_URL may be set in the environment running the tests.
        config.rpc = None;
        let err = run_sync(config).await.expect_err("no rpc");
        assert!(err.to_string().contains("RPC_URL env variable is not set"));
    }
}
