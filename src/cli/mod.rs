// Copyright 2024-2026 dsnpool Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands for the `dsnpool` binary.
//!
//! ## Usage
//!
//! ```bash
//! dsnpool config show       # Effective configuration
//! dsnpool config validate   # Check for contradictory settings
//! dsnpool demo --json       # Walk a pool through acquire, reuse and eviction
//! ```

pub mod config_cmd;
pub mod demo_cmd;

pub use demo_cmd::{run_demo, DemoStep};

/// Exit code for success.
pub const EXIT_OK: i32 = 0;
/// Exit code for a failed check or command.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for an unreadable or invalid configuration.
pub const EXIT_CONFIG: i32 = 2;

/// True if `flag` appears anywhere in `args`.
pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Value following `flag`, if present.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_has_flag() {
        let a = args(&["dsnpool", "demo", "--json"]);
        assert!(has_flag(&a, "--json"));
        assert!(!has_flag(&a, "--pretty"));
    }

    #[test]
    fn test_flag_value() {
        let a = args(&["dsnpool", "config", "validate", "--file", "pool.toml"]);
        assert_eq!(flag_value(&a, "--file"), Some("pool.toml"));
        assert_eq!(flag_value(&args(&["--file"]), "--file"), None);
        assert_eq!(flag_value(&a, "--json"), None);
    }
}
