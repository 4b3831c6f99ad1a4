//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbosity: u8) -> String {
    let (global, local) = match verbosity {
        0 => ("warn", "info"),
        1 => ("warn", "debug"),
        _ => ("info", "trace"),
    };
    format!("{global},chain_indexer={local}")
}

/// Initialize the global fmt subscriber; `RUST_LOG` overrides the verbosity.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
