//! # Logging
//!
//! Log lines go to stderr. `nova-balances derive` prints its snapshot as
//! JSON on stdout, so the two never interleave.
//!
//! The node logs its own startup and API traffic under `nova_balances`,
//! derivation lifecycle under `nova_derive`, and HTTP spans under
//! `tower_http`. Per-block recomputation is logged at `trace`.

use std::convert::Infallible;
use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Deriver setup and derivation failures at `info` and above; request spans
/// from the API layer at `debug`.
pub const DEFAULT_FILTER: &str = "nova_balances=info,nova_derive=info,tower_http=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored output. Suitable for local development.
    Pretty,
    /// Machine-parseable JSON lines. Suitable for production log aggregation.
    Json,
}

impl LogFormat {
    /// Parse a format string. Accepts "json" or "pretty" (case-insensitive).
    /// Returns `Pretty` for any unrecognized value.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

impl FromStr for LogFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_str_lossy(s))
    }
}

/// `RUST_LOG` if set and valid, otherwise `fallback`.
fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Installs the global subscriber for `run` and `derive`.
///
/// `RUST_LOG=nova_derive=trace` shows every recomputation;
/// `RUST_LOG=nova_derive=debug` shows lock subscriptions following account
/// changes. Panics if a subscriber is already installed.
pub fn init_logging(default_level: &str, format: LogFormat) {
    let env_filter = env_filter(default_level);

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true),
                )
                .init();
        }
    }

    tracing::debug!(?format, "logging to stderr");
}
