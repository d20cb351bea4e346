//! Diagnostic logging setup.

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "dlsort=warn";
const VERBOSE_LOG_FILTER: &str = "dlsort=debug";

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

/// Initialize tracing on stderr. `RUST_LOG` overrides the default filter.
///
/// Stdout stays reserved for user-facing output.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init();

    // A subscriber may already be installed when embedded in tests.
    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already set");
    }
}
