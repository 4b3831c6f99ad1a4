//! Run orchestration.
//!
//! - `commands`: subcommand handlers (stats)
//! - `sync_runner`: one-shot and continuous sync cycles

mod commands;
mod sync_runner;

pub use commands::handle_stats;
pub use sync_runner::run_sync;
