//! Tracing setup for applications embedding the engine.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "maildesk_core=debug,maildesk_transport=debug";

/// Install the global tracing subscriber.
///
/// Respects `RUST_LOG` when set, otherwise logs the maildesk crates at
/// debug. Call once at startup.
///
/// # Errors
///
/// Returns [`Error::Config`] if a global subscriber is already installed.
pub fn init() -> Result<()> {
    init_with(DEFAULT_FILTER)
}

/// Install the global tracing subscriber with an explicit fallback filter.
///
/// `RUST_LOG` still wins when set.
///
/// # Errors
///
/// Returns [`Error::Config`] if a global subscriber is already installed.
pub fn init_with(fallback_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| Error::Config(format!("tracing already initialized: {err}")))
}
