use crate::config::OllamaConfig;
use crate::traits::{RawScore, ScoringOracle};
use crate::types::{PaperRecord, PipelineError, Result};
use crate::utils::text;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are an expert researcher who evaluates academic papers. Always respond in valid JSON format.";

/// Abstracts longer than this are cut before prompting.
const MAX_ABSTRACT_CHARS: usize = 4_000;

fn scoring_prompt(record: &PaperRecord) -> String {
    format!(
        "Analyze the abstract of the following paper and rate each criterion from 1 to 10.\n\n\
         Title: {}\n\
         Abstract: {}\n\n\
         Criteria:\n\
         1. Novelty: how new and innovative is this work?\n\
         2. Impact: how much could this work influence its field?\n\
         3. Clarity: how clear and well written is the abstract?\n\n\
         Answer only with JSON in this format:\n\
         {{\"novelty\": <1-10>, \"impact\": <1-10>, \"clarity\": <1-10>, \"reasoning\": \"<one or two sentences>\"}}",
        record.title,
        text::truncate_chars(&record.abstract_text, MAX_ABSTRACT_CHARS)
    )
}

/// Parse an oracle reply, tolerating a Markdown code fence around the JSON.
pub fn parse_score_reply(reply: &str) -> Result<RawScore> {
    let body = text::strip_code_fence(reply);
    serde_json::from_str(body).map_err(|e| PipelineError::Parse(format!("unparsable score reply: {}", e)))
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Scores papers with a local Ollama model.
pub struct OllamaScoringOracle {
    client: Client,
    config: OllamaConfig,
}

impl OllamaScoringOracle {
    pub fn new(config: OllamaConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config: OllamaConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);
        let body = OllamaGenerateRequest {
            model: &self.config.model,
            prompt,
            system: SYSTEM_PROMPT,
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_connect() {
                PipelineError::Transport(format!("cannot reach Ollama at {}", self.config.base_url))
            } else {
                PipelineError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transport(format!("Ollama returned {}: {}", status, body)));
        }

        let parsed: OllamaGenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl ScoringOracle for OllamaScoringOracle {
    fn oracle_name(&self) -> String {
        format!("Ollama ({})", self.config.model)
    }

    async fn score(&self, record: &PaperRecord) -> Result<RawScore> {
        debug!("Scoring {} with {}", record.key(), self.config.model);
        let reply = self.generate(&scoring_prompt(record)).await?;
        parse_score_reply(&reply)
    }
}

/// Scripted oracle for tests and dry runs.
///
/// Scores are looked up by native id; unknown ids get the default score.
pub struct MockScoringOracle {
    scores: HashMap<String, RawScore>,
    default_score: RawScore,
    failures: Mutex<HashMap<String, usize>>,
    always_failing: HashSet<String>,
    response_delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for MockScoringOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScoringOracle {
    pub fn new() -> Self {
        Self {
            scores: HashMap::new(),
            default_score: RawScore::new(5.0, 5.0, 5.0),
            failures: Mutex::new(HashMap::new()),
            always_failing: HashSet::new(),
            response_delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_score(mut self, native_id: &str, novelty: f64, impact: f64, clarity: f64) -> Self {
        self.scores
            .insert(native_id.to_string(), RawScore::new(novelty, impact, clarity));
        self
    }

    pub fn with_default_score(mut self, score: RawScore) -> Self {
        self.default_score = score;
        self
    }

    /// Every call for `native_id` fails.
    pub fn failing(mut self, native_id: &str) -> Self {
        self.always_failing.insert(native_id.to_string());
        self
    }

    /// The first `times` calls for `native_id` fail, later ones succeed.
    pub fn failing_times(self, native_id: &str, times: usize) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(native_id.to_string(), times);
        }
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay = Duration::from_millis(delay_ms);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn scripted(&self, native_id: &str) -> Result<RawScore> {
        if self.always_failing.contains(native_id) {
            return Err(PipelineError::Transport(format!("scripted failure for {}", native_id)));
        }
        if let Ok(mut failures) = self.failures.lock() {
            if let Some(remaining) = failures.get_mut(native_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(PipelineError::Transport(format!("scripted transient failure for {}", native_id)));
                }
            }
        }
        Ok(self
            .scores
            .get(native_id)
            .cloned()
            .unwrap_or_else(|| self.default_score.clone()))
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScoringOracle for MockScoringOracle {
    fn oracle_name(&self) -> String {
        "Mock scoring oracle".to_string()
    }

    async fn score(&self, record: &PaperRecord) -> Result<RawScore> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        // decremented on cancellation too
        let _guard = InFlightGuard(&self.in_flight);

        if !self.response_delay.is_zero() {
            tokio::time::sleep(self.response_delay).await;
        }
        self.scripted(&record.native_id)
    }
}
