//! Tracing subscriber setup
//!
//! Logs go to stderr so the balance CSV on stdout stays machine-readable.
//! `RUST_LOG` selects the filter (default `info`), `LOG_FORMAT=json` switches
//! to one JSON object per line.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; anything but `json` means pretty
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_FORMAT").ok().as_deref())
    }
}

/// Install the global subscriber
///
/// Calling it more than once keeps the first subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::json(Some("json"), LogFormat::Json)]
    #[case::uppercase(Some("JSON"), LogFormat::Json)]
    #[case::pretty(Some("pretty"), LogFormat::Pretty)]
    #[case::unknown(Some("xml"), LogFormat::Pretty)]
    #[case::unset(None, LogFormat::Pretty)]
    fn test_log_format_parsing(#[case] value: Option<&str>, #[case] expected: LogFormat) {
        assert_eq!(LogFormat::parse(value), expected);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
