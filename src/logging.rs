//! Global `tracing` subscriber setup.
//!
//! Library code only emits events through `tracing`; installing a
//! subscriber is left to the embedding binary. These helpers cover the
//! common case: an fmt layer filtered by `RUST_LOG`, falling back to the
//! given default directive.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs the global subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already set. Use
/// [`try_init_logging`] where that can happen, e.g. in tests.
pub fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(filter(default_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Like [`init_logging`] but returns an error instead of panicking when a
/// subscriber is already installed.
///
/// # Examples
///
/// ```
/// let _ = vcompute::logging::try_init_logging("vcompute=debug");
/// ```
pub fn try_init_logging(default_filter: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter(default_filter))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error() {
        let _ = try_init_logging("info");
        assert!(try_init_logging("info").is_err());
    }
}
