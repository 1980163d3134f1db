//! Subscriber setup for stepwise.
//!
//! Every initializer honours `RUST_LOG` and otherwise falls back to
//! [`DEFAULT_FILTER`], which shows per-run and per-step events from the
//! runtime while keeping everything else at `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const DEFAULT_FILTER: &str = "info,stepwise_runtime=debug,stepwise::flow=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Human-readable output on stdout, for development.
///
/// Fails if a global subscriber is already installed.
pub fn init_stdout_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init()?;
    Ok(())
}

/// One JSON object per event, including the fields of the enclosing `Flow`
/// and `Step` spans.
pub fn init_json_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_current_span(true).with_span_list(true))
        .try_init()?;
    Ok(())
}

/// Output captured by the test harness. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_test_writer())
        .try_init();
}
