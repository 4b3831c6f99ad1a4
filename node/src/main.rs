mod chain;
mod classify;
mod cli;
mod logging;
mod run;
mod storage;
mod sync;
#[cfg(test)]
mod test_utils;
mod ui;

use cli::{Command, IndexerConfig};
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let config = IndexerConfig::from_args();
    logging::init_tracing(config.verbosity);

    match config.command {
        Some(Command::Stats) => run::handle_stats(&config),
        None => run::run_sync(config).await,
    }
}
