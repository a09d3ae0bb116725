//! Telemetry and tracing for mx.
//!
//! This crate provides:
//! - Structured logging setup
//! - Timing measurements
//! - JSON log output for debugging

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Environment variable that switches log output to JSON.
pub const LOG_JSON_ENV: &str = "MX_LOG_JSON";

fn default_filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose { "mx=debug" } else { "mx=warn" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialize the tracing subscriber.
///
/// Honors `RUST_LOG`; otherwise logs `mx*` targets at `warn`, or `debug`
/// when `verbose` is set. Panics if a global subscriber is already set,
/// use [`try_init`] from library code and tests.
pub fn init(verbose: bool) {
    if let Err(e) = try_init(verbose) {
        panic!("failed to install tracing subscriber: {e}");
    }
}

/// Initialize the tracing subscriber, returning an error instead of
/// panicking when one is already installed.
pub fn try_init(verbose: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let subscriber = tracing_subscriber::registry().with(default_filter(verbose));

    if std::env::var(LOG_JSON_ENV).is_ok() {
        let json_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        subscriber.with(json_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(false)
            .with_file(false)
            .without_time();

        subscriber.with(fmt_layer).try_init()
    }
}

/// A timing guard that logs duration on drop.
pub struct TimingGuard {
    name: String,
    start: std::time::Instant,
}

impl TimingGuard {
    /// Start timing an operation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: std::time::Instant::now(),
        }
    }

    /// Time elapsed since the guard was created.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}

/// Macro to time a block of code.
#[macro_export]
macro_rules! time {
    ($name:expr, $block:expr) => {{
        let _guard = $crate::TimingGuard::new($name);
        $block
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_macro_returns_block_value() {
        let value = time!("sum", { 2 + 2 });
        assert_eq!(value, 4);
    }

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let _ = try_init(false);
        assert!(try_init(true).is_err());
    }
}
