// Copyright 2024-2026 dsnpool Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration from environment variables, plus a TOML file
//! when `--file` is given.

use std::path::Path;

use crate::config::{self, ConfigError, EffectiveConfig, EnvConfig, ExhaustionPolicy};
use crate::config::{
    ENV_ACQUIRE_TIMEOUT_MS, ENV_EXHAUSTION, ENV_IDLE_TIMEOUT, ENV_LOG_FORMAT, ENV_LOG_LEVEL,
    ENV_MAX_SIZE,
};

use super::{EXIT_CONFIG, EXIT_FAILURE, EXIT_OK};

fn load(file: Option<&Path>) -> Result<EnvConfig, ConfigError> {
    match file {
        Some(path) => config::load_file(path),
        None => Ok(config::load()),
    }
}

/// Print effective config as key-value pairs, or JSON, to stdout.
pub fn run_show(file: Option<&Path>, json: bool) -> i32 {
    let cfg = match load(file) {
        Ok(cfg) => cfg.effective_config(),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return EXIT_CONFIG;
        }
    };
    if json {
        match serde_json::to_string_pretty(&cfg) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                return EXIT_FAILURE;
            }
        }
    } else {
        print_config(&cfg);
    }
    EXIT_OK
}

/// Print default config values, ignoring the environment.
pub fn run_defaults() {
    print_config(&EnvConfig::default().effective_config());
}

/// Collect warnings about settings that contradict each other.
pub fn validate(cfg: &EffectiveConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if cfg.exhaustion == ExhaustionPolicy::Block && cfg.acquire_timeout_ms == 0 {
        warnings.push(format!(
            "{}=block without {}: acquire may wait forever",
            ENV_EXHAUSTION, ENV_ACQUIRE_TIMEOUT_MS
        ));
    }
    if cfg.exhaustion != ExhaustionPolicy::Block && cfg.acquire_timeout_ms > 0 {
        warnings.push(format!(
            "{} is ignored unless {}=block",
            ENV_ACQUIRE_TIMEOUT_MS, ENV_EXHAUSTION
        ));
    }
    if cfg.idle_timeout_secs == 0 {
        warnings.push(format!(
            "{}=0: idle connections are closed immediately and never reused",
            ENV_IDLE_TIMEOUT
        ));
    }
    if tracing_subscriber::EnvFilter::try_new(&cfg.log_level).is_err() {
        warnings.push(format!("{} is not a valid filter: {}", ENV_LOG_LEVEL, cfg.log_level));
    }
    warnings
}

/// Validate configuration.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if the file cannot
/// be loaded.
pub fn run_validate(file: Option<&Path>) -> i32 {
    let cfg = match load(file) {
        Ok(cfg) => cfg.effective_config(),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return EXIT_CONFIG;
        }
    };

    let warnings = validate(&cfg);
    if warnings.is_empty() {
        println!("Configuration is valid.");
        return EXIT_OK;
    }
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }
    EXIT_FAILURE
}

fn print_config(cfg: &EffectiveConfig) {
    println!("{}={}", ENV_MAX_SIZE, cfg.max_size);
    println!("{}={}", ENV_IDLE_TIMEOUT, cfg.idle_timeout_secs);
    println!("{}={}", ENV_EXHAUSTION, cfg.exhaustion);
    println!("{}={}", ENV_ACQUIRE_TIMEOUT_MS, cfg.acquire_timeout_ms);
    println!("{}={}", ENV_LOG_LEVEL, cfg.log_level);
    println!("{}={}", ENV_LOG_FORMAT, cfg.log_format);
}
