//! Diagnostic logging through `tracing`.
//!
//! Test results go to stdout through the runner; this is for what the engine
//! is doing underneath (fixture resolution, hook scheduling, label warnings).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable holding the filter directive, e.g. `rsfixture=debug`.
pub const LOG_ENV: &str = "RSFIXTURE_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install a stderr subscriber filtered by `RSFIXTURE_LOG`.
///
/// Does nothing if a global subscriber is already set, so it is safe to call
/// from every entry point.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    if Registry::default().with(filter).with(stderr).try_init().is_ok() {
        tracing::debug!("logging initialized");
    }
}
