//! Pool configuration loading from environment variables and TOML files.
//!
//! All values have sensible defaults. Invalid environment values fall back
//! to the value already in effect without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `DSNPOOL_MAX_SIZE` | 10 | Connections counted against capacity |
//! | `DSNPOOL_IDLE_TIMEOUT` | 30 | Default idle timeout (secs) |
//! | `DSNPOOL_EXHAUSTION` | overflow | `overflow`, `block` or `fail` |
//! | `DSNPOOL_ACQUIRE_TIMEOUT_MS` | 0 | Block-policy wait limit (0 = none) |
//! | `DSNPOOL_LOG_LEVEL` | info | Log filter directive |
//! | `DSNPOOL_LOG_FORMAT` | json | `json` or `pretty` |

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::DEFAULT_IDLE_TIMEOUT;
use crate::telemetry::{LogConfig, LogFormat};

pub const ENV_MAX_SIZE: &str = "DSNPOOL_MAX_SIZE";
pub const ENV_IDLE_TIMEOUT: &str = "DSNPOOL_IDLE_TIMEOUT";
pub const ENV_EXHAUSTION: &str = "DSNPOOL_EXHAUSTION";
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "DSNPOOL_ACQUIRE_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "DSNPOOL_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "DSNPOOL_LOG_FORMAT";

const DEFAULT_MAX_SIZE: usize = 10;

/// What `acquire` does when every capacity slot is checked out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Open an untracked extra connection, closed directly on release.
    #[default]
    Overflow,
    /// Wait until a release frees a slot.
    Block,
    /// Return [`PoolError::Exhausted`](crate::PoolError::Exhausted).
    Fail,
}

impl FromStr for ExhaustionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overflow" => Ok(Self::Overflow),
            "block" => Ok(Self::Block),
            "fail" => Ok(Self::Fail),
            other => Err(ConfigError::InvalidValue {
                key: "exhaustion".into(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ExhaustionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Overflow => "overflow",
            Self::Block => "block",
            Self::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// Configuration for a single [`Pool`](crate::Pool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: usize,
    /// Idle timeout applied when acquire options do not override it.
    pub idle_timeout: Duration,
    pub exhaustion: ExhaustionPolicy,
    /// Only consulted under [`ExhaustionPolicy::Block`].
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            exhaustion: ExhaustionPolicy::Overflow,
            acquire_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Config with the given capacity and defaults elsewhere.
    pub fn with_max_size(max_size: usize) -> Self {
        Self { max_size, ..Default::default() }
    }
}

/// Errors raised while reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub max_size: usize,
    pub idle_timeout_secs: u64,
    pub exhaustion: ExhaustionPolicy,
    pub acquire_timeout_ms: u64,
    pub log_level: String,
    pub log_format: String,
}

/// All configuration, from defaults, an optional file and the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub pool: PoolConfig,
    pub log: LogConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    pool: FilePoolSection,
    log: FileLogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FilePoolSection {
    max_size: Option<usize>,
    idle_timeout_secs: Option<u64>,
    exhaustion: Option<ExhaustionPolicy>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileLogSection {
    level: Option<String>,
    format: Option<String>,
    output_path: Option<std::path::PathBuf>,
}

/// Parse a `usize` env var, returning `current` on missing or invalid.
fn parse_usize(key: &str, current: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(current),
        Err(_) => current,
    }
}

/// Parse a `u64` env var, returning `None` on missing or invalid.
fn parse_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse::<u64>().ok()
}

fn acquire_timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn apply_env(mut cfg: EnvConfig) -> EnvConfig {
    cfg.pool.max_size = parse_usize(ENV_MAX_SIZE, cfg.pool.max_size).max(1);

    if let Some(secs) = parse_u64(ENV_IDLE_TIMEOUT) {
        cfg.pool.idle_timeout = Duration::from_secs(secs);
    }
    if let Some(policy) = std::env::var(ENV_EXHAUSTION).ok().and_then(|v| v.parse().ok()) {
        cfg.pool.exhaustion = policy;
    }
    if let Some(ms) = parse_u64(ENV_ACQUIRE_TIMEOUT_MS) {
        cfg.pool.acquire_timeout = acquire_timeout_from_ms(ms);
    }
    if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
        if !level.trim().is_empty() {
            cfg.log.level = level.trim().to_string();
        }
    }
    if let Some(format) = std::env::var(ENV_LOG_FORMAT).ok().and_then(|v| v.parse().ok()) {
        cfg.log.format = format;
    }
    cfg
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    apply_env(EnvConfig::default())
}

/// Load a TOML config file, then apply environment overrides on top.
pub fn load_file(path: impl AsRef<Path>) -> Result<EnvConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let file: FileConfig = toml::from_str(&text)?;

    let mut cfg = EnvConfig::default();
    if let Some(max_size) = file.pool.max_size {
        cfg.pool.max_size = max_size.max(1);
    }
    if let Some(secs) = file.pool.idle_timeout_secs {
        cfg.pool.idle_timeout = Duration::from_secs(secs);
    }
    if let Some(policy) = file.pool.exhaustion {
        cfg.pool.exhaustion = policy;
    }
    if let Some(ms) = file.pool.acquire_timeout_ms {
        cfg.pool.acquire_timeout = acquire_timeout_from_ms(ms);
    }
    if let Some(level) = file.log.level {
        cfg.log.level = level;
    }
    if let Some(format) = file.log.format {
        cfg.log.format = format.parse::<LogFormat>().map_err(|_| ConfigError::InvalidValue {
            key: "log.format".into(),
            value: format,
        })?;
    }
    cfg.log.output_path = file.log.output_path;

    Ok(apply_env(cfg))
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            max_size: self.pool.max_size,
            idle_timeout_secs: self.pool.idle_timeout.as_secs(),
            exhaustion: self.pool.exhaustion,
            acquire_timeout_ms: self
                .pool
                .acquire_timeout
                .map(millis)
                .unwrap_or(0),
            log_level: self.log.level.clone(),
            log_format: self.log.format.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        ENV_MAX_SIZE,
        ENV_IDLE_TIMEOUT,
        ENV_EXHAUSTION,
        ENV_ACQUIRE_TIMEOUT_MS,
        ENV_LOG_LEVEL,
        ENV_LOG_FORMAT,
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.pool.max_size, 10);
        assert_eq!(cfg.pool.idle_timeout, Duration::from_secs(30));
        assert_eq!(cfg.pool.exhaustion, ExhaustionPolicy::Overflow);
        assert!(cfg.pool.acquire_timeout.is_none());
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.log.format, LogFormat::Json);
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_MAX_SIZE, "4");
        std::env::set_var(ENV_IDLE_TIMEOUT, "90");
        std::env::set_var(ENV_EXHAUSTION, "Block");
        std::env::set_var(ENV_ACQUIRE_TIMEOUT_MS, "250");
        std::env::set_var(ENV_LOG_FORMAT, "pretty");
        let cfg = load();
        assert_eq!(cfg.pool.max_size, 4);
        assert_eq!(cfg.pool.idle_timeout, Duration::from_secs(90));
        assert_eq!(cfg.pool.exhaustion, ExhaustionPolicy::Block);
        assert_eq!(cfg.pool.acquire_timeout, Some(Duration::from_millis(250)));
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_MAX_SIZE, "lots");
        std::env::set_var(ENV_IDLE_TIMEOUT, "-1");
        std::env::set_var(ENV_EXHAUSTION, "queue");
        let cfg = load();
        assert_eq!(cfg.pool.max_size, 10);
        assert_eq!(cfg.pool.idle_timeout, Duration::from_secs(30));
        assert_eq!(cfg.pool.exhaustion, ExhaustionPolicy::Overflow);
        clear_env_vars();
    }

    #[test]
    fn test_max_size_floor() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_MAX_SIZE, "0");
        let cfg = load();
        assert_eq!(cfg.pool.max_size, 1, "max_size must have floor");
        clear_env_vars();
    }

    #[test]
    fn test_zero_acquire_timeout_means_none() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_ACQUIRE_TIMEOUT_MS, "0");
        assert!(load().pool.acquire_timeout.is_none());
        clear_env_vars();
    }

    #[test]
    fn test_load_file_then_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[pool]\nmax_size = 3\nidle_timeout_secs = 5\nexhaustion = \"fail\"\n\n[log]\nlevel = \"debug\"\nformat = \"pretty\""
        )
        .unwrap();

        std::env::set_var(ENV_MAX_SIZE, "6");
        let cfg = load_file(file.path()).unwrap();
        assert_eq!(cfg.pool.max_size, 6, "env applies on top of file");
        assert_eq!(cfg.pool.idle_timeout, Duration::from_secs(5));
        assert_eq!(cfg.pool.exhaustion, ExhaustionPolicy::Fail);
        assert_eq!(cfg.log.level, "debug");
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_load_file_rejects_unknown_fields() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pool]\nmin_size = 3").unwrap();
        assert!(matches!(load_file(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_file_missing() {
        let err = load_file("/nonexistent/dsnpool.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }

    #[test]
    fn test_effective_config_contains_all_fields() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let eff = load().effective_config();
        assert_eq!(eff.max_size, 10);
        assert_eq!(eff.idle_timeout_secs, 30);
        assert_eq!(eff.exhaustion, ExhaustionPolicy::Overflow);
        assert_eq!(eff.acquire_timeout_ms, 0);
        assert_eq!(eff.log_format, "json");
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(250)), 250);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
