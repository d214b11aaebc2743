//! Log output setup for the binary.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Filter used when `--verbose` is not given and `RUST_LOG` is unset.
const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

/// Builds the filter directive for this crate.
///
/// An explicit level wins over `RUST_LOG`, which wins over the default.
pub fn filter_directive(level: Option<LevelFilter>) -> String {
    let level = level
        .map(|v| v.to_string())
        .unwrap_or_else(|| std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LEVEL.to_string()));
    if level.contains('=') {
        return level;
    }
    format!("{}={level}", env!("CARGO_PKG_NAME").replace('-', "_"))
}

/// Installs the global subscriber. Logs go to stderr so stdout stays
/// clean for `--json` output.
pub fn enable_logging(level: Option<LevelFilter>) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter_directive(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
