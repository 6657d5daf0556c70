//! Contracts for the external collaborators the engine talks to.
//!
//! The engine never performs conversion, authentication, or storage itself.
//! It reaches the job runner through [`JobEndpoint`], asks a
//! [`CredentialProvider`] whether the provider API key is configured, and
//! reads or deletes stored history through a [`RecordStore`].
//!
//! All traits are object safe and used as `Arc<dyn Trait>`.

use async_trait::async_trait;

use crate::error::EndpointError;
use crate::types::{SubmissionRequest, TaskDelta, TaskRecord};

/// The job submission and status endpoints of the external job runner.
#[async_trait]
pub trait JobEndpoint: Send + Sync {
    /// Creates a conversion job and returns the task id the runner assigned.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointError`] if the runner rejects the job or cannot be
    /// reached. A missing provider API key is reported as
    /// [`EndpointErrorKind::MissingCredential`](crate::error::EndpointErrorKind::MissingCredential).
    async fn submit(&self, request: SubmissionRequest) -> Result<String, EndpointError>;

    /// Queries the current status of a task.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointError`] on network failure, timeout, or an
    /// unknown task. The poller treats every such error as transient.
    async fn status(&self, task_id: &str) -> Result<TaskDelta, EndpointError>;
}

/// Reports whether the prerequisite provider API key is configured.
pub trait CredentialProvider: Send + Sync {
    /// Returns `true` if the key is present.
    fn has_api_key(&self) -> bool;
}

/// A credential provider with a fixed answer.
///
/// # Examples
///
/// ```
/// use doctrack::endpoint::{CredentialProvider, StaticCredentials};
///
/// assert!(StaticCredentials::configured().has_api_key());
/// assert!(!StaticCredentials::missing().has_api_key());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticCredentials {
    has_api_key: bool,
}

impl StaticCredentials {
    /// A provider whose key is configured.
    pub fn configured() -> Self {
        Self { has_api_key: true }
    }

    /// A provider whose key is missing.
    pub fn missing() -> Self {
        Self { has_api_key: false }
    }
}

impl CredentialProvider for StaticCredentials {
    fn has_api_key(&self) -> bool {
        self.has_api_key
    }
}

impl<F> CredentialProvider for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn has_api_key(&self) -> bool {
        self()
    }
}

/// The external record store holding past jobs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every stored record for the current session.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointError`] if the store cannot be read.
    async fn fetch_history(&self) -> Result<Vec<TaskRecord>, EndpointError>;

    /// Deletes the stored record (and its artifacts) for `task_id`.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointError`] if the record is unknown or the store
    /// refuses the deletion.
    async fn delete(&self, task_id: &str) -> Result<(), EndpointError>;
}
