//! Asynchronous tracking of long-running document conversion jobs.
//!
//! A user submits a PDF for translation; the job runner converts and
//! translates it in the background. This crate accepts the submission,
//! records the task, polls the runner until the task finishes, and keeps an
//! ordered history that never regresses.
//!
//! # Overview
//!
//! A task moves through `pending` -> `converting` -> `translating` and ends in
//! `success` (with a download reference) or `failed` (with a detail message).
//! Terminal records are immutable and progress never decreases.
//!
//! # Module Organization
//!
//! - [`normalize`] - Filename sanitizing and truncation
//! - [`submit`] - Validation and submission of artifacts
//! - [`poll`] - One timer-driven status cycle per task
//! - [`history`] - The record collection and its merge rules
//! - [`tracker`] - Facade wiring submission, polling, and history
//! - [`endpoint`] - Traits for the job runner, credentials, and record store
//! - [`types`] - Records, deltas, statuses, and languages
//! - [`error`] - Error types
//! - [`config`] - TOML and environment configuration
//! - `http` - reqwest adapter for the runner's JSON API (feature `http-client`)
//! - `logging` - tracing subscriber setup (feature `logging`)

pub mod config;
pub mod constants;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod normalize;
pub mod poll;
pub mod submit;
pub mod tracker;
pub mod types;

#[cfg(feature = "http-client")]
pub mod http;

#[cfg(feature = "logging")]
pub mod logging;

// Re-exports for ergonomic access
pub use config::EngineConfig;
pub use error::{ConfigError, EndpointError, EndpointErrorKind, TaskError};
pub use history::{DeltaOutcome, HistoryListing, TaskHistory};
pub use poll::PollManager;
pub use submit::TaskSubmitter;
pub use tracker::TaskTracker;
pub use types::*;

#[cfg(feature = "http-client")]
pub use http::HttpJobEndpoint;
