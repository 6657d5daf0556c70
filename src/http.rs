//! HTTP adapter for the conversion service's JSON API.
//!
//! Every response uses the envelope `{"success": bool, "data": ..., "error":
//! "...", "code": 404}`. [`HttpJobEndpoint`] implements both [`JobEndpoint`]
//! and [`RecordStore`] on top of it:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | submit | `POST {base}/upload` (multipart `file`, `sourceLanguage`, `targetLanguage`) |
//! | status | `GET {base}/progress?taskId={id}` |
//! | fetch history | `GET {base}/history` |
//! | delete | `DELETE {base}/history/{id}` |
//!
//! Failures are classified into [`EndpointErrorKind`]s: a message naming the
//! provider `API Key` is a missing credential, 401/403 are unauthorized, 404
//! is not found, timeouts and connection failures are transient, bodies that
//! do not decode are malformed, and everything else is a rejection.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;

use crate::config::EngineConfig;
use crate::constants::{DEFAULT_FAILURE_DETAIL, MISSING_API_KEY_MARKER, SUPPORTED_MEDIA_TYPE};
use crate::endpoint::{JobEndpoint, RecordStore};
use crate::error::{EndpointError, EndpointErrorKind};
use crate::types::{Language, SubmissionRequest, TaskDelta, TaskRecord, TaskStatus};

/// Response envelope shared by every API route.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
    code: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadData {
    task_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressData {
    status: TaskStatus,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntry {
    id: String,
    filename: String,
    status: TaskStatus,
    #[serde(default)]
    progress: Option<f64>,
    created_at: String,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    source_language: Option<String>,
    #[serde(default)]
    target_language: Option<String>,
}

/// Client for the conversion service API.
#[derive(Debug, Clone)]
pub struct HttpJobEndpoint {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpJobEndpoint {
    /// Creates a client for `base_url` (for example `http://localhost:5000/api`).
    ///
    /// # Errors
    ///
    /// Returns [`EndpointErrorKind::Transport`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                EndpointError::new(
                    EndpointErrorKind::Transport,
                    format!("failed to create HTTP client: {e}"),
                )
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Creates a client from the API settings in `config`.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn from_config(config: &EngineConfig) -> Result<Self, EndpointError> {
        Self::new(
            config.api_base_url.clone(),
            config.api_token.clone(),
            config.request_timeout(),
        )
    }

    /// The API base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, EndpointError> {
        Url::parse(&format!("{}{path}", self.base_url)).map_err(|e| {
            EndpointError::new(
                EndpointErrorKind::Transport,
                format!("invalid URL {}{path}: {e}", self.base_url),
            )
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends `request` and unwraps the envelope, failing on any
    /// non-success answer.
    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, EndpointError> {
        let response = self.authorize(request).send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(classify_failure(status.as_u16(), None));
            }
            Err(e) => {
                return Err(EndpointError::new(
                    EndpointErrorKind::Malformed,
                    format!("failed to parse response: {e}"),
                ));
            }
        };

        if !status.is_success() || !envelope.success {
            let code = envelope.code.unwrap_or_else(|| status.as_u16());
            return Err(classify_failure(code, envelope.error));
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl JobEndpoint for HttpJobEndpoint {
    async fn submit(&self, request: SubmissionRequest) -> Result<String, EndpointError> {
        let part = reqwest::multipart::Part::bytes(request.payload)
            .file_name(request.display_name.clone())
            .mime_str(SUPPORTED_MEDIA_TYPE)
            .map_err(|e| EndpointError::new(EndpointErrorKind::Malformed, e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("sourceLanguage", request.source_language.code())
            .text("targetLanguage", request.target_language.code());

        tracing::debug!(file = %request.display_name, "uploading document");
        let url = self.url("/upload")?;
        let data: Option<UploadData> = self.call(self.client.post(url).multipart(form)).await?;
        data.map(|d| d.task_id).ok_or_else(|| missing_data("upload"))
    }

    async fn status(&self, task_id: &str) -> Result<TaskDelta, EndpointError> {
        let mut url = self.url("/progress")?;
        url.query_pairs_mut().append_pair("taskId", task_id);

        let data: ProgressData = self
            .call(self.client.get(url))
            .await?
            .ok_or_else(|| missing_data("progress"))?;
        tracing::trace!(task_id, status = %data.status, "progress received");

        let mut delta = TaskDelta::new(data.status, percent(data.progress));
        if let Some(download_url) = data.download_url {
            delta = delta.with_result_ref(download_url);
        }
        if let Some(error) = data.error {
            delta = delta.with_error_detail(error);
        }
        Ok(delta)
    }
}

#[async_trait]
impl RecordStore for HttpJobEndpoint {
    async fn fetch_history(&self) -> Result<Vec<TaskRecord>, EndpointError> {
        let url = self.url("/history")?;
        let entries: Vec<HistoryEntry> = self
            .call(self.client.get(url))
            .await?
            .unwrap_or_default();

        let records = entries
            .into_iter()
            .filter_map(|entry| {
                let id = entry.id.clone();
                match entry.into_record() {
                    Ok(record) => Some(record),
                    Err(err) => {
                        tracing::warn!(task_id = %id, error = %err, "skipping history entry");
                        None
                    }
                }
            })
            .collect();
        Ok(records)
    }

    async fn delete(&self, task_id: &str) -> Result<(), EndpointError> {
        let mut url = self.url("/history")?;
        url.path_segments_mut()
            .map_err(|()| {
                EndpointError::new(EndpointErrorKind::Transport, "base URL cannot hold a path")
            })?
            .push(task_id);
        let _: Option<IgnoredAny> = self.call(self.client.delete(url)).await?;
        tracing::debug!(task_id, "history entry deleted");
        Ok(())
    }
}

impl HistoryEntry {
    fn into_record(self) -> Result<TaskRecord, EndpointError> {
        let created_at = parse_timestamp(&self.created_at)?;
        let source_language = parse_language(self.source_language.as_deref(), Language::English)?;
        let target_language =
            parse_language(self.target_language.as_deref(), Language::ChineseSimplified)?;

        let mut record = TaskRecord::pending(self.id, self.filename, source_language, target_language);
        record.created_at = created_at;
        record.progress = percent(self.progress);
        match self.status {
            TaskStatus::Success => match self.download_url {
                Some(url) => {
                    record.status = TaskStatus::Success;
                    record.progress = 100;
                    record.result_ref = Some(url);
                }
                // Finished but not downloadable yet; keep polling it.
                None => {
                    record.status = TaskStatus::Translating;
                    record.progress = record.progress.min(99);
                }
            },
            TaskStatus::Failed => {
                record.status = TaskStatus::Failed;
                record.error_detail = Some(DEFAULT_FAILURE_DETAIL.to_string());
            }
            status => record.status = status,
        }
        Ok(record)
    }
}

/// Maps a failure message and status code to an [`EndpointError`].
fn classify_failure(code: u16, message: Option<String>) -> EndpointError {
    let message = message.unwrap_or_else(|| match StatusCode::from_u16(code) {
        Ok(status) => format!("request failed with status {status}"),
        Err(_) => format!("request failed with code {code}"),
    });

    let kind = if message.contains(MISSING_API_KEY_MARKER) {
        EndpointErrorKind::MissingCredential
    } else {
        match code {
            401 | 403 => EndpointErrorKind::Unauthorized,
            404 => EndpointErrorKind::NotFound,
            _ => EndpointErrorKind::Rejected,
        }
    };
    EndpointError::new(kind, message)
}

fn transport_error(err: reqwest::Error) -> EndpointError {
    let kind = if err.is_timeout() {
        EndpointErrorKind::Timeout
    } else if err.is_decode() {
        EndpointErrorKind::Malformed
    } else {
        EndpointErrorKind::Transport
    };
    EndpointError::new(kind, err.to_string())
}

fn missing_data(route: &str) -> EndpointError {
    EndpointError::new(
        EndpointErrorKind::Malformed,
        format!("{route} response has no data"),
    )
}

fn percent(progress: Option<f64>) -> u8 {
    progress
        .filter(|p| p.is_finite())
        .map(|p| p.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0)
}

/// Accepts RFC 3339 and naive ISO 8601 timestamps (read as UTC).
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, EndpointError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            EndpointError::new(
                EndpointErrorKind::Malformed,
                format!("invalid timestamp '{raw}': {e}"),
            )
        })
}

fn parse_language(raw: Option<&str>, default: Language) -> Result<Language, EndpointError> {
    match raw {
        Some(code) => code
            .parse()
            .map_err(|e: crate::error::TaskError| {
                EndpointError::new(EndpointErrorKind::Malformed, e.to_string())
            }),
        None => Ok(default),
    }
}
