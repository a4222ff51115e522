//! Fuzz target for acquire option parsing.
//!
//! Arbitrary option lists must never panic, and every entry that is not a
//! well-formed lifetime setting must produce exactly one warning.

#![no_main]

use dsnpool::options::{AcquireOptions, DEFAULT_IDLE_TIMEOUT};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|options: Vec<String>| {
    let (resolved, warnings) = AcquireOptions::parse(&options, DEFAULT_IDLE_TIMEOUT);
    assert!(warnings.len() <= options.len());
    if warnings.len() == options.len() {
        assert_eq!(resolved.idle_timeout, DEFAULT_IDLE_TIMEOUT);
    }
});
