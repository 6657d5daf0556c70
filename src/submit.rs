//! Task submission: validate an artifact, normalize its name, and hand it to
//! the job submission endpoint.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::constants::{MAX_FILENAME_LENGTH, MIN_FILENAME_LENGTH, SUPPORTED_MEDIA_TYPE};
use crate::endpoint::{CredentialProvider, JobEndpoint};
use crate::error::TaskError;
use crate::normalize::{is_too_long, normalize};
use crate::types::{Artifact, Language, SubmissionRequest};

/// Message returned when the provider API key is not configured.
pub const MISSING_CREDENTIAL_MESSAGE: &str = "please configure the provider API Key before converting";

/// Validates artifacts and submits them as conversion jobs.
///
/// The submitter does not register records or start polling; the
/// [`TaskTracker`](crate::tracker::TaskTracker) does that with the returned id.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use doctrack::endpoint::StaticCredentials;
/// use doctrack::{Artifact, Language, TaskSubmitter};
/// # use doctrack::endpoint::JobEndpoint;
///
/// # async fn example(endpoint: Arc<dyn JobEndpoint>) -> Result<(), doctrack::TaskError> {
/// let submitter = TaskSubmitter::new(endpoint, Arc::new(StaticCredentials::configured()));
/// let task_id = submitter
///     .submit(
///         Artifact::pdf("a.pdf", b"%PDF".to_vec()),
///         Language::English,
///         Language::ChineseSimplified,
///     )
///     .await?;
/// println!("submitted {task_id}");
/// # Ok(())
/// # }
/// ```
pub struct TaskSubmitter {
    endpoint: Arc<dyn JobEndpoint>,
    credentials: Arc<dyn CredentialProvider>,
    max_filename_length: usize,
    supported_media_type: String,
}

impl std::fmt::Debug for TaskSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSubmitter")
            .field("max_filename_length", &self.max_filename_length)
            .field("supported_media_type", &self.supported_media_type)
            .finish_non_exhaustive()
    }
}

impl TaskSubmitter {
    /// Creates a submitter with the default name limit and media type.
    pub fn new(endpoint: Arc<dyn JobEndpoint>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            endpoint,
            credentials,
            max_filename_length: MAX_FILENAME_LENGTH,
            supported_media_type: SUPPORTED_MEDIA_TYPE.to_string(),
        }
    }

    /// Creates a submitter using the limits in `config`.
    pub fn from_config(
        endpoint: Arc<dyn JobEndpoint>,
        credentials: Arc<dyn CredentialProvider>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(endpoint, credentials)
            .with_max_filename_length(config.max_filename_length)
            .with_supported_media_type(config.supported_media_type.clone())
    }

    /// Sets the name limit. Values below the minimum are raised to it.
    pub fn with_max_filename_length(mut self, max_length: usize) -> Self {
        self.max_filename_length = max_length.max(MIN_FILENAME_LENGTH);
        self
    }

    /// Sets the one accepted media type.
    pub fn with_supported_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.supported_media_type = media_type.into();
        self
    }

    /// The effective name limit.
    pub fn max_filename_length(&self) -> usize {
        self.max_filename_length
    }

    /// Submits `artifact` for conversion and returns the assigned task id.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Validation`] for an unsupported media type or a name
    ///   that still exceeds the limit after normalization.
    /// - [`TaskError::Configuration`] if the provider API key is missing,
    ///   either locally or as reported by the endpoint.
    /// - [`TaskError::Submission`] for any other endpoint failure.
    pub async fn submit(
        &self,
        artifact: Artifact,
        source_language: Language,
        target_language: Language,
    ) -> Result<String, TaskError> {
        self.submit_named(artifact, source_language, target_language)
            .await
            .map(|(task_id, _)| task_id)
    }

    /// Like [`submit`](Self::submit), also returning the normalized name.
    pub(crate) async fn submit_named(
        &self,
        artifact: Artifact,
        source_language: Language,
        target_language: Language,
    ) -> Result<(String, String), TaskError> {
        self.validate(&artifact)?;

        let display_name = normalize(&artifact.name, self.max_filename_length);
        if is_too_long(&display_name, self.max_filename_length) {
            return Err(TaskError::validation(format!(
                "file name exceeds {} characters after normalization",
                self.max_filename_length
            )));
        }

        if !self.credentials.has_api_key() {
            tracing::warn!(file = %display_name, "submission blocked: provider API key missing");
            return Err(TaskError::Configuration {
                message: MISSING_CREDENTIAL_MESSAGE.to_string(),
            });
        }

        let request = SubmissionRequest {
            display_name: display_name.clone(),
            source_language,
            target_language,
            payload: artifact.payload,
        };
        match self.endpoint.submit(request).await {
            Ok(task_id) => {
                tracing::info!(
                    task_id = %task_id,
                    file = %display_name,
                    source = %source_language,
                    target = %target_language,
                    "conversion job submitted"
                );
                Ok((task_id, display_name))
            }
            Err(err) => {
                tracing::warn!(file = %display_name, error = %err, "submission rejected");
                Err(err.into())
            }
        }
    }

    fn validate(&self, artifact: &Artifact) -> Result<(), TaskError> {
        if artifact.media_type != self.supported_media_type {
            return Err(TaskError::validation(format!(
                "unsupported media type '{}', expected '{}'",
                artifact.media_type, self.supported_media_type
            )));
        }
        Ok(())
    }
}
