//! Error types for task submission, tracking, and endpoint calls.
//!
//! [`TaskError`] is what callers of the engine see. [`EndpointError`] is what
//! external collaborators report; the poller absorbs it, the submission path
//! maps it into [`TaskError`]. [`ConfigError`] covers configuration loading.

use crate::types::task::TaskStatus;

/// Errors surfaced by task operations.
///
/// Validation, submission, and configuration errors propagate to the caller
/// of [`TaskSubmitter::submit`](crate::submit::TaskSubmitter::submit). None of
/// them are retried automatically.
///
/// # Examples
///
/// ```
/// use doctrack::TaskError;
///
/// let err = TaskError::Configuration {
///     message: "please configure your API Key".to_string(),
/// };
/// assert!(err.is_configuration());
/// assert!(err.is_submission());
/// assert_eq!(err.user_message(), "please configure your API Key");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The input artifact was rejected locally.
    #[error("validation failed: {reason}")]
    Validation {
        /// Why the artifact was rejected.
        reason: String,
    },

    /// The job submission endpoint rejected the request.
    #[error("submission rejected ({kind}): {message}")]
    Submission {
        /// Short classification reported by the endpoint.
        kind: String,
        /// The endpoint's message, shown to the user as-is.
        message: String,
    },

    /// A prerequisite credential (the provider API key) is not configured.
    ///
    /// This is a distinguished kind of submission failure: callers route the
    /// user to configuration instead of showing a generic error.
    #[error("configuration required: {message}")]
    Configuration {
        /// Actionable description of what is missing.
        message: String,
    },

    /// A record with this id is already tracked.
    #[error("duplicate task id: {task_id}")]
    DuplicateId {
        /// The conflicting task id.
        task_id: String,
    },

    /// A status transition out of a terminal state was requested.
    #[error("invalid transition from {from} to {to} for task {task_id}")]
    InvalidTransition {
        /// The task being transitioned.
        task_id: String,
        /// Current status.
        from: TaskStatus,
        /// Rejected target status.
        to: TaskStatus,
    },
}

impl TaskError {
    /// Creates a [`TaskError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the user must be sent to configuration to fix this.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns `true` for endpoint rejections, configuration ones included.
    pub fn is_submission(&self) -> bool {
        matches!(self, Self::Submission { .. } | Self::Configuration { .. })
    }

    /// The message to show the user.
    ///
    /// Endpoint-originated errors return the endpoint's own message; local
    /// errors return their display form.
    pub fn user_message(&self) -> String {
        match self {
            Self::Submission { message, .. } | Self::Configuration { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Classification of a failure reported by an external endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointErrorKind {
    /// The provider API key the job runner needs is missing.
    MissingCredential,
    /// The endpoint refused the request.
    Rejected,
    /// The task or record does not exist.
    NotFound,
    /// The session is not authorized.
    Unauthorized,
    /// The endpoint could not be reached.
    Transport,
    /// The request timed out.
    Timeout,
    /// The endpoint answered with something unparseable.
    Malformed,
}

impl EndpointErrorKind {
    /// Stable lowercase name, used as the `kind` of [`TaskError::Submission`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::Rejected => "rejected",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Malformed => "malformed",
        }
    }

    /// Returns `true` for network-level failures a later attempt may not hit.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport | Self::Timeout)
    }
}

impl std::fmt::Display for EndpointErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by a job, status, or record-store endpoint.
///
/// # Examples
///
/// ```
/// use doctrack::{EndpointError, EndpointErrorKind};
///
/// let err = EndpointError::new(EndpointErrorKind::Timeout, "no answer after 30s");
/// assert!(err.kind.is_transient());
/// assert_eq!(err.to_string(), "timeout: no answer after 30s");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EndpointError {
    /// What went wrong.
    pub kind: EndpointErrorKind,
    /// The endpoint's message.
    pub message: String,
}

impl EndpointError {
    /// Creates an endpoint error.
    pub fn new(kind: EndpointErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<EndpointError> for TaskError {
    fn from(err: EndpointError) -> Self {
        match err.kind {
            EndpointErrorKind::MissingCredential => Self::Configuration {
                message: err.message,
            },
            kind => Self::Submission {
                kind: kind.as_str().to_string(),
                message: err.message,
            },
        }
    }
}

/// Errors raised while loading [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {error}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error message.
        error: String,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value parsed but is not usable.
    #[error("invalid config: {0}")]
    Invalid(String),
}
