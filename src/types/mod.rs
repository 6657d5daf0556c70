//! Task data types.
//!
//! - [`task`] - [`TaskStatus`], [`Language`], [`TaskRecord`], [`TaskDelta`]
//! - [`params`] - [`Artifact`] and [`SubmissionRequest`]

pub mod params;
pub mod task;

pub use params::*;
pub use task::*;
