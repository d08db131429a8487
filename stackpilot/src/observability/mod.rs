//! Log subscriber setup and request timing.

mod timer;

pub use timer::RequestTimer;

use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact human-readable lines.
    Console,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses `STACKPILOT_LOG_FORMAT`. Anything but `json` is console output.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Console
        }
    }
}

fn resolve_env_filter() -> EnvFilter {
    if let Ok(level) = std::env::var("STACKPILOT_LOG") {
        if let Ok(filter) = EnvFilter::try_new(level) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber once per process.
///
/// Environment variables:
/// - `STACKPILOT_LOG`: level or filter directive (`info`, `stackpilot=debug`, ...).
/// - `RUST_LOG`: used when `STACKPILOT_LOG` is unset or invalid; defaults to `info`.
/// - `STACKPILOT_LOG_FORMAT`: `json` for JSON lines, otherwise console output.
///
/// Logs go to stderr; stdout is reserved for the event stream.
pub fn init_tracing() {
    INIT.get_or_init(|| {
        let format = std::env::var("STACKPILOT_LOG_FORMAT")
            .map_or(LogFormat::Console, |v| LogFormat::parse(&v));
        let env_filter = resolve_env_filter();

        match format {
            LogFormat::Json => {
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init();
            }
            LogFormat::Console => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}
