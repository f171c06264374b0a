//! Process-wide log output.
//!
//! Records go to stdout, one line each. `RUST_LOG` selects what is emitted
//! and defaults to `info`. Access records use the `exgate::access` target,
//! so `RUST_LOG=exgate::access=off` silences them alone.

use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber. A second call is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(true)
        .try_init();
}
