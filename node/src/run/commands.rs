//! Subcommand handlers.

use crate::cli::IndexerConfig;
use crate::storage::SqliteStore;
use crate::ui;
use eyre::Result;

/// Handle the `stats` subcommand.
pub fn handle_stats(config: &IndexerConfig) -> Result<()> {
    let store = SqliteStore::open(&config.db_path)?;
    let counts = store.counts()?;
    let stats = store.deploy_stats()?;
    ui::print_stats(&counts, &stats)
}
