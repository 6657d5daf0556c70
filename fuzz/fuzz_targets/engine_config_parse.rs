//! Fuzz target for TOML config parsing.
//!
//! Feeds arbitrary input to `EngineConfig::from_toml()`; errors are fine,
//! panics are not.
//!
//! Run with: `cargo +nightly fuzz run engine_config_parse`

#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = doctrack::EngineConfig::from_toml(s) {
            let _ = config.validate();
        }
    }
});
