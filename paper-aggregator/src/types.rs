use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
// Downstream hand-off types
pub use interfaces::defs::{DigestModel, DigestOutput, DigestPreferences, DigestSelectedItem, InputItem};

/// Raw, source-specific payload kept on every record for enrichment.
pub type RawPayload = serde_json::Value;

/// Name of a configured source (e.g. `arxiv`, `hf_daily`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identity of a record within one run: `(source, native id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub source: SourceId,
    pub native_id: String,
}

impl RecordKey {
    pub fn new(source: impl Into<SourceId>, native_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            native_id: native_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.native_id)
    }
}

/// Explicit pointer from a record to the same paper in another source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    pub source: SourceId,
    pub native_id: String,
}

impl CrossReference {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.source.clone(), self.native_id.clone())
    }
}

/// Normalized paper metadata, uniform across sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    pub source: SourceId,
    pub native_id: String,
    pub title: String,
    /// Ordered, never empty.
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub published: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub primary_category: Option<String>,
    pub tags: Vec<String>,
    /// Upvotes or similar; absent for sources without one.
    pub popularity: Option<u64>,
    pub cross_reference: Option<CrossReference>,
    pub pdf_url: Option<String>,
    pub landing_url: Option<String>,
    pub comment_count: Option<u64>,
    pub github_repo: Option<String>,
    pub github_stars: Option<u64>,
    pub thumbnail_url: Option<String>,
    pub raw: RawPayload,
}

impl PaperRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.source.clone(), self.native_id.clone())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl From<&PaperRecord> for InputItem {
    fn from(record: &PaperRecord) -> Self {
        let text = format!(
            "{}\n\nAuthors: {}\n\nCategories: {}\n\nAbstract: {}",
            record.title,
            record.authors.join(", "),
            record.tags.join(", "),
            record.abstract_text
        );

        Self {
            uri: record.landing_url.clone().unwrap_or_else(|| record.key().to_string()),
            live_source_uri: record.source.to_string(),
            text,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Malformed record from {source_id}: {reason}")]
    MalformedRecord { source_id: SourceId, reason: String },

    #[error("Source {source_id} unavailable: {reason}")]
    SourceUnavailable { source_id: SourceId, reason: String },

    #[error("Scoring unavailable for {key}: {reason}")]
    ScoringUnavailable { key: RecordKey, reason: String },

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn malformed(source_id: &SourceId, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            source_id: source_id.clone(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(source_id: &SourceId, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.clone(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
