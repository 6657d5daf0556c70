//! Filename normalization: sanitize, truncate, and disambiguate.
//!
//! Names arrive from users and go on to storage and transport, so they are
//! cleaned before anything else sees them. [`normalize`] runs the pipeline
//! and never fails: every input, the empty string included, yields a usable
//! non-empty name no longer than the requested maximum.
//!
//! Lengths are counted in `char`s, so a CJK name of 40 characters is 40 long
//! regardless of its UTF-8 size.
//!
//! # Examples
//!
//! ```
//! use doctrack::normalize::normalize;
//!
//! assert_eq!(normalize("  my report.pdf ", 100), "my_report.pdf");
//! assert_eq!(normalize("file<>:\"/\\|?*name.pdf", 100), "file_________name.pdf");
//!
//! let long = format!("{}.pdf", "x".repeat(300));
//! let short = normalize(&long, 100);
//! assert_eq!(short.chars().count(), 100);
//! assert!(short.ends_with(".pdf"));
//! assert!(short.contains("..."));
//! ```

use chrono::Utc;

use crate::constants::{
    ELLIPSIS, MAX_FILENAME_LENGTH, MIN_FILENAME_LENGTH, PLACEHOLDER_BASE, TIME_SUFFIX_DIGITS,
};

/// Characters that are not portable in file names.
const DISALLOWED: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Shortest base a truncated name may keep before a synthetic base replaces it.
const MIN_TRUNCATED_BASE: usize = 3;

/// Sanitizes and truncates `raw` to at most `max_length` characters.
///
/// `max_length` values below
/// [`MIN_FILENAME_LENGTH`](crate::constants::MIN_FILENAME_LENGTH) are raised
/// to it. Empty input yields a synthetic `file_NNNNNN` name; an input that is
/// only an extension (`.pdf`) yields `file_NNNNNN.pdf`.
///
/// Idempotent: normalizing a normalized name returns it unchanged.
pub fn normalize(raw: &str, max_length: usize) -> String {
    let max_length = max_length.max(MIN_FILENAME_LENGTH);
    let sanitized = sanitize(raw);
    if sanitized.is_empty() {
        return synthetic_base();
    }

    let named = if is_extension_only(raw) {
        format!("{}.{sanitized}", synthetic_base())
    } else {
        sanitized
    };
    truncate(&named, max_length)
}

/// [`normalize`] with the default maximum of 100 characters.
pub fn normalize_default(raw: &str) -> String {
    normalize(raw, MAX_FILENAME_LENGTH)
}

/// Replaces or strips characters that are unsafe in stored names.
///
/// Disallowed punctuation becomes `_`, control characters are removed,
/// leading and trailing runs of dots and whitespace are stripped, and every
/// remaining whitespace run collapses to one `_`.
///
/// # Examples
///
/// ```
/// use doctrack::normalize::sanitize;
///
/// assert_eq!(sanitize("..hidden  file\u{0007}.pdf.. "), "hidden_file.pdf");
/// assert_eq!(sanitize("a|b"), "a_b");
/// assert_eq!(sanitize(" . "), "");
/// ```
pub fn sanitize(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .filter(|c| !is_control(*c))
        .map(|c| if DISALLOWED.contains(&c) { '_' } else { c })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());

    let mut out = String::with_capacity(trimmed.len());
    let mut in_whitespace = false;
    for c in trimmed.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}

/// Shortens `name` to at most `max_length` characters, keeping its extension.
///
/// The base keeps a head and a tail joined by `...`. When the extension
/// leaves no room for a base, the placeholder `file` stands in (with the
/// extension cut to fit if needed). When fewer than three base characters
/// would survive next to the ellipsis, the base is replaced by trailing
/// epoch-millisecond digits filling the room the extension leaves.
///
/// # Examples
///
/// ```
/// use doctrack::normalize::truncate;
///
/// assert_eq!(truncate("short.pdf", 100), "short.pdf");
///
/// let name = format!("{}.pdf", "abcdefghij".repeat(3));
/// assert_eq!(truncate(&name, 20), "abcdefg...efghij.pdf");
/// ```
pub fn truncate(name: &str, max_length: usize) -> String {
    let max_length = max_length.max(MIN_FILENAME_LENGTH);
    if name.chars().count() <= max_length {
        return name.to_string();
    }

    let (base, ext) = split_extension(name);
    let ext_len = ext.chars().count();
    let placeholder_len = PLACEHOLDER_BASE.chars().count();

    if placeholder_len + ext_len > max_length {
        let ext: String = ext.chars().take(max_length - placeholder_len).collect();
        return format!("{PLACEHOLDER_BASE}{ext}");
    }

    let available = max_length.saturating_sub(ELLIPSIS.len() + ext_len);
    if available < MIN_TRUNCATED_BASE {
        // At least `placeholder_len` characters remain for the base here.
        let width = (max_length - ext_len).min(TIME_SUFFIX_DIGITS);
        return format!("{}{ext}", time_digits(width));
    }

    let head_len = available.div_ceil(2);
    let tail_len = available - head_len;
    let base_len = base.chars().count();
    let head: String = base.chars().take(head_len).collect();
    let tail: String = base.chars().skip(base_len - tail_len).collect();
    format!("{head}{ELLIPSIS}{tail}{ext}")
}

/// Appends a short time-derived suffix before the extension.
///
/// Callers use this when a name collides with one already in the history.
/// The result is bounded by the default maximum length.
///
/// # Examples
///
/// ```
/// use doctrack::normalize::add_disambiguator;
///
/// let name = add_disambiguator("report.pdf");
/// assert!(name.starts_with("report_"));
/// assert!(name.ends_with(".pdf"));
/// assert_eq!(name.len(), "report_123456.pdf".len());
/// ```
pub fn add_disambiguator(name: &str) -> String {
    if name.is_empty() {
        return synthetic_base();
    }
    let suffix = time_digits(TIME_SUFFIX_DIGITS);
    let (base, ext) = split_extension(name);
    let with_suffix = if base.is_empty() {
        // Extension-only names get the same `file_NNNNNN` base as `normalize`.
        format!("{PLACEHOLDER_BASE}_{suffix}{ext}")
    } else {
        format!("{base}_{suffix}{ext}")
    };
    truncate(&with_suffix, MAX_FILENAME_LENGTH)
}

/// Returns `true` if `name` is longer than `max_length` characters.
pub fn is_too_long(name: &str, max_length: usize) -> bool {
    name.chars().count() > max_length
}

/// Splits at the final `.`; the extension keeps its dot.
///
/// A name whose only dot is its first character has no base, and is treated
/// as all extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) => name.split_at(idx),
        None => (name, ""),
    }
}

/// `true` for names such as `.pdf`: a leading dot run followed by a single
/// dot-free segment.
fn is_extension_only(raw: &str) -> bool {
    let cleaned: String = raw.chars().filter(|c| !is_control(*c)).collect();
    let trimmed = cleaned.trim();
    let Some(rest) = trimmed.strip_prefix('.') else {
        return false;
    };
    let rest = rest.trim_start_matches('.');
    !rest.is_empty() && !rest.contains('.')
}

fn is_control(c: char) -> bool {
    matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}')
}

fn synthetic_base() -> String {
    format!("{PLACEHOLDER_BASE}_{}", time_digits(TIME_SUFFIX_DIGITS))
}

/// The last `width` digits of the current epoch milliseconds, zero-padded.
fn time_digits(width: usize) -> String {
    let modulus = 10_i64.pow(width as u32);
    let value = Utc::now().timestamp_millis().rem_euclid(modulus);
    format!("{value:0width$}")
}
