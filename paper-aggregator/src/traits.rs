use crate::config::SourceConfig;
use crate::types::{PaperRecord, RawPayload, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A paper source: fetches raw payloads and normalizes them into records.
///
/// Implementations are stateless between runs; everything they need comes
/// from the `SourceConfig` passed in.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Pull raw payloads from the source.
    ///
    /// Fails with `SourceUnavailable` when the source cannot be reached.
    async fn fetch(&self, config: &SourceConfig) -> Result<Vec<RawPayload>>;

    /// Turn one payload into a record, or `MalformedRecord` when title,
    /// authors or published date are missing.
    fn normalize(&self, config: &SourceConfig, payload: RawPayload) -> Result<PaperRecord>;
}

/// Uncalibrated component scores as returned by a scoring oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawScore {
    pub novelty: f64,
    pub impact: f64,
    pub clarity: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl RawScore {
    pub fn new(novelty: f64, impact: f64, clarity: f64) -> Self {
        Self {
            novelty,
            impact,
            clarity,
            reasoning: None,
        }
    }
}

/// External judgement of a paper's novelty, impact and clarity.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    fn oracle_name(&self) -> String;

    async fn score(&self, record: &PaperRecord) -> Result<RawScore>;
}
