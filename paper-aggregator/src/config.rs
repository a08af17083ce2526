use crate::filter::FilterSpec;
use crate::types::{PipelineError, Result, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";
pub const HF_DAILY_PAPERS_URL: &str = "https://huggingface.co/api/daily_papers";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Minimum spacing between two requests to the same host.
    pub min_request_interval_ms: u64,
    pub max_response_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "paper-aggregator/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_ms: 500,
            min_request_interval_ms: 3_000, // arXiv asks for 3s between calls
            max_response_size_mb: 20,
            max_redirects: 5,
        }
    }
}

/// Weights of the three score components in the weighted mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub novelty: f64,
    pub impact: f64,
    pub clarity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            novelty: 1.0,
            impact: 1.0,
            clarity: 1.0,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.novelty + self.impact + self.clarity
    }

    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [("novelty", self.novelty), ("impact", self.impact), ("clarity", self.clarity)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(PipelineError::invalid_config(format!(
                    "score weight '{}' must be a finite non-negative number, got {}",
                    name, weight
                )));
            }
        }
        if self.sum() <= 0.0 {
            return Err(PipelineError::invalid_config("score weights must not all be zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub call_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Cap on concurrent oracle calls across the whole run.
    pub max_in_flight: usize,
    pub weights: ScoreWeights,
    /// Scored candidates below this total never reach ranking.
    pub min_total: Option<f64>,
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen3:8b".to_string(),
            temperature: 0.3,
            max_tokens: 500,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 120_000,
            max_retries: 2,
            retry_delay_ms: 500,
            max_in_flight: 4,
            weights: ScoreWeights::default(),
            min_total: None,
            ollama: OllamaConfig::default(),
        }
    }
}

impl OracleConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if self.max_in_flight == 0 {
            return Err(PipelineError::invalid_config("oracle.max_in_flight must be at least 1"));
        }
        if self.call_timeout_ms == 0 {
            return Err(PipelineError::invalid_config("oracle.call_timeout_ms must be positive"));
        }
        Url::parse(&self.ollama.base_url).map_err(|e| {
            PipelineError::invalid_config(format!("oracle.ollama.base_url '{}': {}", self.ollama.base_url, e))
        })?;
        if let Some(min_total) = self.min_total {
            if !(1.0..=10.0).contains(&min_total) {
                return Err(PipelineError::invalid_config(format!(
                    "oracle.min_total must lie in [1, 10], got {}",
                    min_total
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Arxiv,
    CommunityFeed,
}

/// What to do when a payload lacks title, authors or published date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Exclude the whole source for this run.
    #[default]
    FailSource,
    /// Drop the payload and keep going.
    SkipRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: SourceId,
    pub kind: SourceKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Defaults to `true` for arXiv sources and `false` otherwise.
    #[serde(default)]
    pub rankable: Option<bool>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Categories sent to the source query; falls back to the filter tags.
    #[serde(default)]
    pub query_categories: Vec<String>,
    /// Source that native ids of this source point at, when they look like one.
    #[serde(default)]
    pub cross_reference_source: Option<SourceId>,
    #[serde(default)]
    pub filter: FilterSpec,
    #[serde(default)]
    pub malformed_policy: MalformedPolicy,
}

fn default_enabled() -> bool {
    true
}

fn default_max_results() -> usize {
    200
}

impl SourceConfig {
    pub fn new(id: impl Into<SourceId>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: true,
            rankable: None,
            endpoint: None,
            max_results: default_max_results(),
            query_categories: Vec::new(),
            cross_reference_source: None,
            filter: FilterSpec::default(),
            malformed_policy: MalformedPolicy::default(),
        }
    }

    pub fn arxiv() -> Self {
        Self::new("arxiv", SourceKind::Arxiv)
    }

    pub fn community_feed() -> Self {
        let mut config = Self::new("hf_daily", SourceKind::CommunityFeed);
        config.max_results = 50;
        config.cross_reference_source = Some(SourceId::new("arxiv"));
        config
    }

    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_rankable(mut self, rankable: bool) -> Self {
        self.rankable = Some(rankable);
        self
    }

    pub fn is_rankable(&self) -> bool {
        self.rankable.unwrap_or(self.kind == SourceKind::Arxiv)
    }

    pub fn endpoint(&self) -> &str {
        match (&self.endpoint, self.kind) {
            (Some(endpoint), _) => endpoint,
            (None, SourceKind::Arxiv) => ARXIV_API_URL,
            (None, SourceKind::CommunityFeed) => HF_DAILY_PAPERS_URL,
        }
    }

    fn validate(&self) -> Result<()> {
        Url::parse(self.endpoint()).map_err(|e| {
            PipelineError::invalid_config(format!("source {}: bad endpoint '{}': {}", self.id, self.endpoint(), e))
        })?;
        if self.max_results == 0 {
            return Err(PipelineError::invalid_config(format!(
                "source {}: max_results must be at least 1",
                self.id
            )));
        }
        self.filter
            .validate()
            .map_err(|e| PipelineError::invalid_config(format!("source {}: {}", self.id, config_reason(e))))
    }
}

fn config_reason(err: PipelineError) -> String {
    match err {
        PipelineError::ConfigurationInvalid(reason) => reason,
        other => other.to_string(),
    }
}

/// Validated-at-run-start options for one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default = "default_top_n")]
    pub top_n: i64,
    #[serde(default)]
    pub run_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

fn default_top_n() -> i64 {
    10
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            sources: vec![SourceConfig::arxiv(), SourceConfig::community_feed()],
            top_n: default_top_n(),
            run_timeout_seconds: None,
            oracle: OracleConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl RunOptions {
    pub fn with_sources(sources: Vec<SourceConfig>) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|source| source.enabled)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_seconds.map(Duration::from_secs)
    }

    /// Every check that makes a run impossible; nothing is fetched when this fails.
    pub fn validate(&self) -> Result<()> {
        if self.enabled_sources().next().is_none() {
            return Err(PipelineError::invalid_config("no sources enabled"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(&source.id) {
                return Err(PipelineError::invalid_config(format!("duplicate source id '{}'", source.id)));
            }
        }

        for source in self.enabled_sources() {
            source.validate()?;
        }

        if self.run_timeout_seconds == Some(0) {
            return Err(PipelineError::invalid_config("run_timeout_seconds must be positive"));
        }

        self.oracle.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DateWindowSpec;
    use chrono::NaiveDate;

    fn assert_invalid(options: &RunOptions, fragment: &str) {
        match options.validate() {
            Err(PipelineError::ConfigurationInvalid(reason)) => {
                assert!(reason.contains(fragment), "unexpected reason: {}", reason)
            }
            other => panic!("expected ConfigurationInvalid, got {:?}", other),
        }
    }

    #[test]
    fn defaults_are_valid() {
        RunOptions::default().validate().unwrap();
    }

    #[test]
    fn no_enabled_sources_is_invalid() {
        let mut options = RunOptions::default();
        for source in &mut options.sources {
            source.enabled = false;
        }
        assert_invalid(&options, "no sources enabled");
        assert_invalid(&RunOptions::with_sources(Vec::new()), "no sources enabled");
    }

    #[test]
    fn contradictory_window_is_invalid() {
        let mut window = DateWindowSpec::last_days(3);
        window.from = NaiveDate::from_ymd_opt(2025, 1, 1);
        let mut source = SourceConfig::arxiv();
        source.filter.date_window = window;

        assert_invalid(&RunOptions::with_sources(vec![source]), "source arxiv");
    }

    #[test]
    fn duplicate_ids_are_invalid() {
        let options = RunOptions::with_sources(vec![SourceConfig::arxiv(), SourceConfig::arxiv()]);
        assert_invalid(&options, "duplicate source id");
    }

    #[test]
    fn bad_weights_are_invalid() {
        let mut options = RunOptions::default();
        options.oracle.weights.impact = -1.0;
        assert_invalid(&options, "impact");

        options.oracle.weights = ScoreWeights {
            novelty: 0.0,
            impact: 0.0,
            clarity: 0.0,
        };
        assert_invalid(&options, "all be zero");
    }

    #[test]
    fn zero_in_flight_is_invalid() {
        let mut options = RunOptions::default();
        options.oracle.max_in_flight = 0;
        assert_invalid(&options, "max_in_flight");
    }

    #[test]
    fn bad_endpoint_is_invalid() {
        let mut source = SourceConfig::community_feed();
        source.endpoint = Some("not a url".to_string());
        assert_invalid(&RunOptions::with_sources(vec![source]), "bad endpoint");
    }

    #[test]
    fn rankable_defaults_by_kind() {
        assert!(SourceConfig::arxiv().is_rankable());
        assert!(!SourceConfig::community_feed().is_rankable());
        assert!(SourceConfig::community_feed().with_rankable(true).is_rankable());
    }

    #[test]
    fn deserializes_minimal_json() {
        let options: RunOptions = serde_json::from_str(
            r#"{
                "top_n": 5,
                "sources": [
                    {"id": "arxiv", "kind": "arxiv",
                     "filter": {"tags": {"mode": "AND", "tags": ["cs.CV", "cs.AI"]},
                                "date_window": {"from": "2025-11-01", "to": "2025-11-03"}}},
                    {"id": "hf_daily", "kind": "community_feed", "enabled": false}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(options.top_n, 5);
        assert_eq!(options.enabled_sources().count(), 1);
        assert_eq!(options.sources[0].filter.date_window.last_days, None);
        assert_eq!(options.oracle.max_retries, 2);
        options.validate().unwrap();
    }
}
