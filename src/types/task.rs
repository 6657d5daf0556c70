//! Core task types: status, languages, the task record, and status deltas.
//!
//! # Serialization
//!
//! [`TaskRecord`] serializes as a flat record with `camelCase` field names.
//! `resultRef` and `errorDetail` serialize as `null` when absent rather than
//! being omitted, so the storage layer always sees the same shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_FAILURE_DETAIL;
use crate::error::TaskError;

/// Lifecycle status of a conversion task.
///
/// # State Machine
///
/// ```text
/// Pending | Converting | Translating -> any status (same-stage polls included)
/// Success -> (terminal, no transitions)
/// Failed  -> (terminal, no transitions)
/// ```
///
/// # Examples
///
/// ```
/// use doctrack::TaskStatus;
///
/// assert!(!TaskStatus::Converting.is_terminal());
/// assert!(TaskStatus::Converting.can_transition_to(&TaskStatus::Translating));
/// assert!(TaskStatus::Converting.can_transition_to(&TaskStatus::Converting));
/// assert!(!TaskStatus::Success.can_transition_to(&TaskStatus::Translating));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted by the job runner, not started.
    Pending,
    /// The document is being converted.
    #[serde(alias = "processing")]
    Converting,
    /// The converted content is being translated.
    Translating,
    /// Finished; the output can be retrieved (terminal).
    Success,
    /// Finished with an error (terminal).
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Converting => write!(f, "converting"),
            Self::Translating => write!(f, "translating"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    /// Returns `true` for `Success` and `Failed`.
    ///
    /// # Examples
    ///
    /// ```
    /// use doctrack::TaskStatus;
    ///
    /// assert!(!TaskStatus::Pending.is_terminal());
    /// assert!(!TaskStatus::Translating.is_terminal());
    /// assert!(TaskStatus::Success.is_terminal());
    /// assert!(TaskStatus::Failed.is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Returns `true` if a record in this status may move to `next`.
    ///
    /// Non-terminal states accept every target, themselves included, because
    /// consecutive polls routinely report the same stage. Terminal states
    /// accept nothing.
    pub fn can_transition_to(&self, _next: &Self) -> bool {
        !self.is_terminal()
    }

    /// Validates a transition from this status to `next`.
    ///
    /// # Examples
    ///
    /// ```
    /// use doctrack::TaskStatus;
    ///
    /// assert!(TaskStatus::Pending
    ///     .validate_transition("t1", &TaskStatus::Converting)
    ///     .is_ok());
    /// assert!(TaskStatus::Failed
    ///     .validate_transition("t1", &TaskStatus::Pending)
    ///     .is_err());
    /// ```
    pub fn validate_transition(&self, task_id: &str, next: &Self) -> Result<(), TaskError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TaskError::InvalidTransition {
                task_id: task_id.to_string(),
                from: *self,
                to: *next,
            })
        }
    }
}

/// Languages the conversion service translates between.
///
/// Codes follow the job service: `en`, `zh-CN`, `ja`, `ko`, `fr`, `de`, `es`,
/// `ru`. `zh` is accepted as an alias for `zh-CN`.
///
/// # Examples
///
/// ```
/// use doctrack::Language;
///
/// let lang: Language = "zh".parse().unwrap();
/// assert_eq!(lang, Language::ChineseSimplified);
/// assert_eq!(lang.code(), "zh-CN");
/// assert!("xx".parse::<Language>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// English.
    #[serde(rename = "en")]
    English,
    /// Simplified Chinese.
    #[serde(rename = "zh-CN", alias = "zh")]
    ChineseSimplified,
    /// Japanese.
    #[serde(rename = "ja")]
    Japanese,
    /// Korean.
    #[serde(rename = "ko")]
    Korean,
    /// French.
    #[serde(rename = "fr")]
    French,
    /// German.
    #[serde(rename = "de")]
    German,
    /// Spanish.
    #[serde(rename = "es")]
    Spanish,
    /// Russian.
    #[serde(rename = "ru")]
    Russian,
}

impl Language {
    /// Every supported language.
    pub const ALL: [Language; 8] = [
        Self::English,
        Self::ChineseSimplified,
        Self::Japanese,
        Self::Korean,
        Self::French,
        Self::German,
        Self::Spanish,
        Self::Russian,
    ];

    /// The wire code for this language.
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::ChineseSimplified => "zh-CN",
            Self::Japanese => "ja",
            Self::Korean => "ko",
            Self::French => "fr",
            Self::German => "de",
            Self::Spanish => "es",
            Self::Russian => "ru",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("zh") {
            return Ok(Self::ChineseSimplified);
        }
        Self::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| TaskError::validation(format!("unsupported language code: {s}")))
    }
}

/// One tracked conversion task.
///
/// Created in `Pending` with progress 0 when the job runner accepts a
/// submission. Afterwards it changes only through
/// [`TaskHistory::apply_delta`](crate::history::TaskHistory::apply_delta).
///
/// # Examples
///
/// ```
/// use doctrack::{Language, TaskRecord, TaskStatus};
///
/// let record = TaskRecord::pending("t1", "a.pdf", Language::English, Language::ChineseSimplified);
/// assert_eq!(record.status, TaskStatus::Pending);
/// assert_eq!(record.progress, 0);
///
/// let json = serde_json::to_value(&record).unwrap();
/// assert_eq!(json["displayName"], "a.pdf");
/// assert_eq!(json["targetLanguage"], "zh-CN");
/// assert!(json["resultRef"].is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Identifier assigned by the job runner.
    pub id: String,

    /// Normalized artifact name.
    pub display_name: String,

    /// Language of the submitted document.
    pub source_language: Language,

    /// Language to translate into.
    pub target_language: Language,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Percent complete, 0 to 100.
    pub progress: u8,

    /// Reference to the output artifact. Set only in `Success`.
    #[serde(default)]
    pub result_ref: Option<String>,

    /// Failure description. Set only in `Failed`.
    #[serde(default)]
    pub error_detail: Option<String>,

    /// When the task was created.
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Creates a `Pending` record with progress 0, timestamped now.
    pub fn pending(
        id: impl Into<String>,
        display_name: impl Into<String>,
        source_language: Language,
        target_language: Language,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            source_language,
            target_language,
            status: TaskStatus::Pending,
            progress: 0,
            result_ref: None,
            error_detail: None,
            created_at: Utc::now(),
        }
    }

    /// Returns `true` once the record reached `Success` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Brings a record from outside the history in line with the merge rules.
    ///
    /// Progress is clamped to 100. A `success` without a result reference is
    /// not finished yet: it becomes `translating` with progress at most 99. A
    /// `failed` record without detail gets the default one. Payload fields
    /// that do not belong to the status are cleared.
    ///
    /// # Examples
    ///
    /// ```
    /// use doctrack::{Language, TaskRecord, TaskStatus};
    ///
    /// let mut record = TaskRecord::pending("t1", "a.pdf", Language::English, Language::ChineseSimplified);
    /// record.status = TaskStatus::Success;
    /// record.progress = 250;
    ///
    /// let settled = record.settle();
    /// assert_eq!(settled.status, TaskStatus::Translating);
    /// assert_eq!(settled.progress, 99);
    /// assert!(!settled.is_terminal());
    /// ```
    #[must_use]
    pub fn settle(mut self) -> Self {
        self.progress = self.progress.min(100);
        match self.status {
            TaskStatus::Success if self.result_ref.is_some() => {
                self.progress = 100;
                self.error_detail = None;
            }
            TaskStatus::Success => {
                self.status = TaskStatus::Translating;
                self.progress = self.progress.min(99);
                self.error_detail = None;
            }
            TaskStatus::Failed => {
                if self.error_detail.is_none() {
                    self.error_detail = Some(DEFAULT_FAILURE_DETAIL.to_string());
                }
                self.result_ref = None;
            }
            _ => {
                self.result_ref = None;
                self.error_detail = None;
            }
        }
        self
    }

    /// The status fields of this record as a delta.
    pub fn to_delta(&self) -> TaskDelta {
        TaskDelta {
            status: self.status,
            progress: self.progress,
            result_ref: self.result_ref.clone(),
            error_detail: self.error_detail.clone(),
        }
    }
}

/// An incremental status update for one task, as returned by a status query.
///
/// # Examples
///
/// ```
/// use doctrack::{TaskDelta, TaskStatus};
///
/// let delta = TaskDelta::new(TaskStatus::Converting, 130);
/// assert_eq!(delta.progress, 100); // clamped
/// assert!(!delta.is_terminal());
///
/// // `success` only finishes a task once the output reference is present.
/// assert!(!TaskDelta::new(TaskStatus::Success, 100).is_terminal());
/// assert!(TaskDelta::success("out1").is_terminal());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDelta {
    /// Reported status.
    pub status: TaskStatus,

    /// Reported progress, 0 to 100.
    #[serde(default)]
    pub progress: u8,

    /// Output reference, expected with `success`.
    #[serde(default)]
    pub result_ref: Option<String>,

    /// Failure description, expected with `failed`.
    #[serde(default)]
    pub error_detail: Option<String>,
}

impl TaskDelta {
    /// Creates a delta with no result or error, clamping `progress` to 100.
    pub fn new(status: TaskStatus, progress: u8) -> Self {
        Self {
            status,
            progress: progress.min(100),
            result_ref: None,
            error_detail: None,
        }
    }

    /// A finished delta carrying the output reference.
    pub fn success(result_ref: impl Into<String>) -> Self {
        Self::new(TaskStatus::Success, 100).with_result_ref(result_ref)
    }

    /// A failed delta carrying the failure description.
    pub fn failed(error_detail: impl Into<String>) -> Self {
        Self::new(TaskStatus::Failed, 0).with_error_detail(error_detail)
    }

    /// Sets the output reference.
    pub fn with_result_ref(mut self, result_ref: impl Into<String>) -> Self {
        self.result_ref = Some(result_ref.into());
        self
    }

    /// Sets the failure description.
    pub fn with_error_detail(mut self, error_detail: impl Into<String>) -> Self {
        self.error_detail = Some(error_detail.into());
        self
    }

    /// Returns `true` if applying this delta finishes the task.
    ///
    /// `failed` always does. `success` does only with a result reference;
    /// without one the job runner has not published the output yet.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Failed => true,
            TaskStatus::Success => self.result_ref.is_some(),
            _ => false,
        }
    }

    /// The failure description, or the default one.
    pub fn error_detail_or_default(&self) -> String {
        self.error_detail
            .clone()
            .unwrap_or_else(|| DEFAULT_FAILURE_DETAIL.to_string())
    }
}
