//! Tracing setup for binaries built on duelsync.
//!
//! Library crates only emit `tracing` events; installing a subscriber is
//! the application's call. This is the one-liner for applications that
//! don't need anything fancier.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Installs a formatting subscriber filtered by `RUST_LOG` (default
/// `info`).
///
/// Returns `false` if a global subscriber was already installed, which is
/// harmless: tests and embedding applications often install their own.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_does_not_panic() {
        init_tracing();
        assert!(!init_tracing());
    }
}
