//! Log setup for the `stakelink` binary.
//!
//! stdout carries the report or the JSON wallet, so every log line goes to
//! stderr. A plain run stays quiet apart from discovery progress; `-v`
//! opens up the engine's and the data source's own events.

use std::io;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Progress lines and warnings only.
const QUIET_FILTER: &str = "warn,stakelink::progress=info";

/// Engine and data-source detail, including retries and page walks.
const VERBOSE_FILTER: &str = "info,stakelink_discovery=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per line, for piping into `jq`.
    Json,
}

impl LogFormat {
    /// `"json"` in any case selects JSON; anything else falls back to pretty.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        QUIET_FILTER
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_logging(verbose: bool, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_writer(io::stderr)
                        .with_target(verbose),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(io::stderr).with_target(true))
                .init();
        }
    }

    tracing::debug!(?format, verbose, "logging ready");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lenient() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("colourful"), LogFormat::Pretty);
    }

    #[test]
    fn verbose_filter_is_a_superset_of_the_quiet_one() {
        assert!(default_filter(false).starts_with("warn"));
        assert!(default_filter(true).contains("stakelink_discovery=debug"));
        assert!(EnvFilter::try_new(default_filter(false)).is_ok());
        assert!(EnvFilter::try_new(default_filter(true)).is_ok());
    }
}
