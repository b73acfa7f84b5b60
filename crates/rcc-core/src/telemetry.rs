//! Process-wide tracing initialisation.
//!
//! The `ros_cross_compile` binary calls [`init_tracing`] once, before any
//! engine client or stage is constructed. Library code never installs a
//! subscriber of its own.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::engine::log::ENGINE_OUTPUT_TARGET;

/// Filter used when `RUST_LOG` is unset.
///
/// Build and container output is the point of a run, so it stays at INFO
/// even when `level` is quieter.
pub fn default_filter(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("{level},{ENGINE_OUTPUT_TARGET}=info")
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON instead of human-readable lines.
/// * `level`: default verbosity when `RUST_LOG` is not set.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        // Keep the target so engine output can be told apart downstream.
        registry.with(fmt::layer().json()).try_init().ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}
