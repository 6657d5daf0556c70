//! Fuzz target for filename normalization.
//!
//! Feeds arbitrary UTF-8 names and length budgets to `normalize()` and checks
//! the output contract: non-empty, within the budget, free of disallowed
//! characters, and stable under a second pass.
//!
//! Run with: `cargo +nightly fuzz run filename_normalize`

#![no_main]
use doctrack::constants::MIN_FILENAME_LENGTH;
use doctrack::normalize::normalize;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&budget, rest)) = data.split_first() else {
        return;
    };
    let Ok(raw) = std::str::from_utf8(rest) else {
        return;
    };

    let max_length = usize::from(budget);
    let name = normalize(raw, max_length);

    assert!(!name.is_empty());
    assert!(name.chars().count() <= max_length.max(MIN_FILENAME_LENGTH));
    assert!(!name.contains(['<', '>', ':', '"', '/', '\\', '|', '?', '*']));
    assert!(!name.chars().any(char::is_control));
    assert_eq!(normalize(&name, max_length), name);
});
