use crate::config::{OracleConfig, ScoreWeights};
use crate::traits::{RawScore, ScoringOracle};
use crate::types::{PaperRecord, PipelineError, RecordKey, Result};
use crate::utils::retry_backoff;
use backoff::backoff::Backoff;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

pub const MIN_COMPONENT: f64 = 1.0;
pub const MAX_COMPONENT: f64 = 10.0;

/// Validated novelty score; every component lies in `[1, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoveltyScore {
    novelty: f64,
    impact: f64,
    clarity: f64,
    total: f64,
}

impl NoveltyScore {
    /// Clamp the components and combine them with the weighted mean.
    pub fn compute(raw: &RawScore, weights: &ScoreWeights) -> Result<Self> {
        let clamp = |name: &str, value: f64| {
            if value.is_finite() {
                Ok(value.clamp(MIN_COMPONENT, MAX_COMPONENT))
            } else {
                Err(PipelineError::Parse(format!("{} is not a finite number", name)))
            }
        };
        let novelty = clamp("novelty", raw.novelty)?;
        let impact = clamp("impact", raw.impact)?;
        let clarity = clamp("clarity", raw.clarity)?;

        let total = (weights.novelty * novelty + weights.impact * impact + weights.clarity * clarity) / weights.sum();

        Ok(Self {
            novelty,
            impact,
            clarity,
            total: total.clamp(MIN_COMPONENT, MAX_COMPONENT),
        })
    }

    pub fn novelty(&self) -> f64 {
        self.novelty
    }

    pub fn impact(&self) -> f64 {
        self.impact
    }

    pub fn clarity(&self) -> f64 {
        self.clarity
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub record: PaperRecord,
    pub score: NoveltyScore,
    pub reasoning: Option<String>,
}

/// A candidate that never reached ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringExclusion {
    pub key: RecordKey,
    pub reason: String,
    pub attempts: u32,
}

#[derive(Debug)]
pub enum ScoreOutcome {
    Scored(ScoredCandidate),
    Excluded(ScoringExclusion),
}

/// Caps concurrent oracle calls for a whole run.
#[derive(Debug, Clone)]
pub struct ScoringLimiter {
    semaphore: Arc<Semaphore>,
    max_in_flight: usize,
}

impl ScoringLimiter {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits in FIFO order for a permit.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::Transport(format!("scoring limiter closed: {}", e)))
    }
}

/// Timeout, retry and validation around a `ScoringOracle`.
pub struct ScoringOracleClient {
    oracle: Arc<dyn ScoringOracle>,
    limiter: ScoringLimiter,
    config: OracleConfig,
}

impl ScoringOracleClient {
    pub fn new(oracle: Arc<dyn ScoringOracle>, limiter: ScoringLimiter, config: OracleConfig) -> Self {
        Self {
            oracle,
            limiter,
            config,
        }
    }

    /// Score one record. Failures never escape: after the last retry the
    /// record is reported as an exclusion instead.
    pub async fn score(&self, record: PaperRecord) -> ScoreOutcome {
        let key = record.key();
        let mut backoff = retry_backoff(self.config.retry_delay_ms);
        let mut attempts = 0;

        let last_error = loop {
            attempts += 1;
            let error = match self.attempt(&record).await {
                Ok((score, reasoning)) => {
                    return self.admit(record, score, reasoning, attempts);
                }
                Err(e) => e,
            };

            if attempts > self.config.max_retries {
                break error;
            }
            let delay = backoff
                .next_backoff()
                .unwrap_or_else(|| std::time::Duration::from_millis(self.config.retry_delay_ms));
            warn!(
                "Scoring attempt {} for {} failed ({}), retrying in {:?}",
                attempts, key, error, delay
            );
            tokio::time::sleep(delay).await;
        };

        let error = PipelineError::ScoringUnavailable {
            key: key.clone(),
            reason: last_error.to_string(),
        };
        warn!("{} after {} attempts", error, attempts);
        ScoreOutcome::Excluded(ScoringExclusion {
            key,
            reason: error.to_string(),
            attempts,
        })
    }

    async fn attempt(&self, record: &PaperRecord) -> Result<(NoveltyScore, Option<String>)> {
        let timeout = self.config.call_timeout();
        // Permit covers the oracle call only, not the backoff sleep.
        let _permit = self.limiter.acquire().await?;
        let raw = tokio::time::timeout(timeout, self.oracle.score(record))
            .await
            .map_err(|_| PipelineError::Timeout(timeout))??;
        let score = NoveltyScore::compute(&raw, &self.config.weights)?;
        Ok((score, raw.reasoning))
    }

    fn admit(&self, record: PaperRecord, score: NoveltyScore, reasoning: Option<String>, attempts: u32) -> ScoreOutcome {
        if let Some(min_total) = self.config.min_total {
            if score.total() < min_total {
                debug!("{} scored {:.2}, below minimum {:.2}", record.key(), score.total(), min_total);
                return ScoreOutcome::Excluded(ScoringExclusion {
                    key: record.key(),
                    reason: format!("total {:.2} below minimum {:.2}", score.total(), min_total),
                    attempts,
                });
            }
        }
        debug!("{} scored {:.2}", record.key(), score.total());
        ScoreOutcome::Scored(ScoredCandidate {
            record,
            score,
            reasoning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_adapter::MockScoringOracle;
    use crate::types::SourceId;
    use chrono::{TimeZone, Utc};

    fn record(native_id: &str) -> PaperRecord {
        PaperRecord {
            source: SourceId::new("arxiv"),
            native_id: native_id.to_string(),
            title: format!("Paper {}", native_id),
            authors: Vec::new(),
            abstract_text: String::new(),
            published: Utc.with_ymd_and_hms(2025, 11, 2, 9, 0, 0).unwrap(),
            updated: None,
            primary_category: None,
            tags: Vec::new(),
            popularity: None,
            cross_reference: None,
            pdf_url: None,
            landing_url: None,
            comment_count: None,
            github_repo: None,
            github_stars: None,
            thumbnail_url: None,
            raw: serde_json::Value::Null,
        }
    }

    fn client(oracle: MockScoringOracle, config: OracleConfig) -> ScoringOracleClient {
        let limiter = ScoringLimiter::new(config.max_in_flight);
        ScoringOracleClient::new(Arc::new(oracle), limiter, config)
    }

    #[test]
    fn components_are_clamped() {
        let score = NoveltyScore::compute(&RawScore::new(12.0, 0.0, 5.5), &ScoreWeights::default()).unwrap();

        assert_eq!(score.novelty(), 10.0);
        assert_eq!(score.impact(), 1.0);
        assert_eq!(score.clarity(), 5.5);
        assert!((score.total() - 16.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn total_is_weighted_mean() {
        let weights = ScoreWeights {
            novelty: 2.0,
            impact: 1.0,
            clarity: 0.0,
        };
        let score = NoveltyScore::compute(&RawScore::new(9.0, 3.0, 1.0), &weights).unwrap();
        assert!((score.total() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn total_never_decreases_when_a_component_grows() {
        let weights = ScoreWeights::default();
        let mut previous = 0.0;
        for novelty in 1..=10 {
            let score = NoveltyScore::compute(&RawScore::new(novelty as f64, 4.0, 6.0), &weights).unwrap();
            assert!(score.total() >= previous);
            assert!((MIN_COMPONENT..=MAX_COMPONENT).contains(&score.total()));
            previous = score.total();
        }
    }

    #[test]
    fn non_finite_components_are_rejected() {
        for raw in [
            RawScore::new(f64::NAN, 5.0, 5.0),
            RawScore::new(5.0, f64::INFINITY, 5.0),
            RawScore::new(5.0, 5.0, f64::NEG_INFINITY),
        ] {
            assert!(matches!(
                NoveltyScore::compute(&raw, &ScoreWeights::default()),
                Err(PipelineError::Parse(_))
            ));
        }
    }

    #[tokio::test]
    async fn limiter_hands_out_bounded_permits() {
        let limiter = ScoringLimiter::new(2);
        let first = limiter.acquire().await.unwrap();
        let _second = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);

        drop(first);
        assert_eq!(limiter.available(), 1);
        assert_eq!(limiter.max_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_oracle_call_times_out_and_is_excluded() {
        let config = OracleConfig {
            call_timeout_ms: 1_000,
            max_retries: 1,
            max_in_flight: 1,
            retry_delay_ms: 10,
            ..OracleConfig::default()
        };
        let scoring = client(MockScoringOracle::new().with_delay(5_000), config);

        match scoring.score(record("h1")).await {
            ScoreOutcome::Excluded(exclusion) => {
                assert_eq!(exclusion.key, RecordKey::new("arxiv", "h1"));
                assert_eq!(exclusion.attempts, 2);
                assert!(exclusion.reason.contains("Timed out"), "{}", exclusion.reason);
            }
            ScoreOutcome::Scored(candidate) => panic!("unexpected score {:?}", candidate.score),
        }
        assert_eq!(scoring.limiter.available(), 1);
    }

    #[tokio::test]
    async fn low_totals_are_excluded_after_scoring() {
        let config = OracleConfig {
            min_total: Some(4.0),
            ..OracleConfig::default()
        };
        let oracle = MockScoringOracle::new()
            .with_default_score(RawScore::new(2.0, 3.0, 4.0))
            .with_score("good", 8.0, 7.0, 6.0);
        let scoring = client(oracle, config);

        assert!(matches!(scoring.score(record("good")).await, ScoreOutcome::Scored(_)));
        match scoring.score(record("weak")).await {
            ScoreOutcome::Excluded(exclusion) => {
                assert_eq!(exclusion.attempts, 1);
                assert!(exclusion.reason.contains("below minimum"));
            }
            ScoreOutcome::Scored(_) => panic!("weak paper should not be ranked"),
        }
    }
}
