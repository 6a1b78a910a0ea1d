//! Tracing subscriber setup

use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins; otherwise the profile's default level applies. Calling
/// this twice is harmless.
pub fn init(environment: &Environment) {
    let _ = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(environment.default_log_level())),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
