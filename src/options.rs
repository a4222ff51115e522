//! Per-acquire option grammar.
//!
//! Options are `Key=Value` strings. The only recognized key is
//! `SetConnMaxLifetime` (whole seconds), which sets the idle timeout of the
//! returned connection. Anything else produces a warning and is ignored.

use std::time::Duration;

use thiserror::Error;

/// Option key overriding the idle timeout.
pub const CONN_MAX_LIFETIME_KEY: &str = "SetConnMaxLifetime";

/// Idle timeout used when no option overrides it.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Non-fatal problems found while parsing acquire options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionWarning {
    #[error("Unrecognized option key: {0}")]
    UnknownKey(String),

    #[error("Malformed option (expected Key=Value): {0}")]
    Malformed(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Options resolved for a single acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    pub idle_timeout: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self { idle_timeout: DEFAULT_IDLE_TIMEOUT }
    }
}

impl AcquireOptions {
    /// Parse `options`, starting from `default_timeout`.
    ///
    /// Later occurrences of a key win. Never fails: every problem is
    /// reported as an [`OptionWarning`] and the default is kept.
    pub fn parse<S: AsRef<str>>(
        options: &[S],
        default_timeout: Duration,
    ) -> (Self, Vec<OptionWarning>) {
        let mut resolved = Self { idle_timeout: default_timeout };
        let mut warnings = Vec::new();

        for raw in options {
            let raw = raw.as_ref();
            let Some((key, value)) = raw.split_once('=') else {
                warnings.push(OptionWarning::Malformed(raw.to_string()));
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            if key != CONN_MAX_LIFETIME_KEY {
                warnings.push(OptionWarning::UnknownKey(key.to_string()));
                continue;
            }

            match value.parse::<u64>() {
                Ok(secs) => resolved.idle_timeout = Duration::from_secs(secs),
                Err(_) => warnings.push(OptionWarning::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            }
        }

        (resolved, warnings)
    }
}
