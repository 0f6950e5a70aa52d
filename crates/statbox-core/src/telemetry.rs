//! Tracing initialisation for statbox binaries.
//!
//! Stdout belongs to command output: the execution result or the validation
//! diagnostics, as JSON a caller can parse. Lifecycle events from [`crate::obs`]
//! therefore go to stderr. A second call to [`init_tracing`] is a no-op.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber on stderr, as text or one JSON object per
/// line with `json`. `RUST_LOG` overrides `level`.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
