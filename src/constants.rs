//! Constants for task tracking defaults and filename limits.

/// Default delay between two status queries for the same task, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Maximum length of a normalized display name, in characters, extension included.
pub const MAX_FILENAME_LENGTH: usize = 100;

/// Smallest length budget the normalizer accepts. Smaller budgets are raised
/// to this value so every fallback name still fits.
pub const MIN_FILENAME_LENGTH: usize = 16;

/// The only media type the submission path accepts.
pub const SUPPORTED_MEDIA_TYPE: &str = "application/pdf";

/// Joins the head and tail of a truncated base name.
pub const ELLIPSIS: &str = "...";

/// Base name used when the extension leaves no room for the original base.
pub const PLACEHOLDER_BASE: &str = "file";

/// Number of trailing epoch-millisecond digits used for synthetic names and
/// disambiguation suffixes.
pub const TIME_SUFFIX_DIGITS: usize = 6;

/// Detail recorded for a `failed` status that arrives without one.
pub const DEFAULT_FAILURE_DETAIL: &str = "conversion failed";

/// Marker the job service uses in rejections caused by a missing provider API key.
pub const MISSING_API_KEY_MARKER: &str = "API Key";
