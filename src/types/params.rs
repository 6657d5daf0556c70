//! Submission inputs: the artifact a user picked and the request sent to the
//! job submission endpoint.

use serde::{Deserialize, Serialize};

use crate::constants::SUPPORTED_MEDIA_TYPE;
use crate::types::task::Language;

/// A document selected for conversion.
///
/// # Examples
///
/// ```
/// use doctrack::Artifact;
///
/// let artifact = Artifact::pdf("report.pdf", b"%PDF-1.7".to_vec());
/// assert_eq!(artifact.media_type, "application/pdf");
/// assert_eq!(artifact.len(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Name as supplied by the user, untrusted.
    pub name: String,
    /// Declared media type.
    pub media_type: String,
    /// File contents.
    pub payload: Vec<u8>,
}

impl Artifact {
    /// Creates an artifact.
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            payload,
        }
    }

    /// Creates an artifact with the supported document media type.
    pub fn pdf(name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::new(name, SUPPORTED_MEDIA_TYPE, payload)
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// The payload issued to the job submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    /// Normalized artifact name.
    pub display_name: String,
    /// Language of the document.
    pub source_language: Language,
    /// Language to translate into.
    pub target_language: Language,
    /// Document bytes.
    #[serde(skip)]
    pub payload: Vec<u8>,
}
