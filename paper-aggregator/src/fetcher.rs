use crate::config::FetchConfig;
use crate::types::{PipelineError, Result, SourceId};
use crate::utils::retry_backoff;
use backoff::backoff::Backoff;
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Shared HTTP access for source adapters.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// GET `url` with `query` and return the body as text.
    ///
    /// Retries transport errors and non-success statuses with exponential
    /// backoff; once retries are exhausted the source is reported unavailable.
    pub async fn fetch_text(&self, source_id: &SourceId, url: &str, query: &[(&str, String)]) -> Result<String> {
        let parsed = Url::parse_with_params(url, query)?;
        let mut backoff = retry_backoff(self.config.retry_delay_ms);
        let mut last_error = None;

        debug!("Fetching {} for source {}", parsed, source_id);

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit(&parsed).await;

            match self.send(&parsed).await {
                Ok(content) => {
                    info!("Fetched {} for source {} ({} bytes)", parsed, source_id, content.len());
                    return Ok(content);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, parsed, delay);
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        error!(
            "Failed to fetch {} after {} attempts: {}",
            parsed,
            self.config.max_retries + 1,
            reason
        );
        Err(PipelineError::unavailable(source_id, reason))
    }

    async fn send(&self, url: &Url) -> Result<String> {
        let response: Response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(PipelineError::Transport(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_response_size_mb {
                return Err(PipelineError::Transport(format!("Response too large: {}MB", size_mb)));
            }
        }

        Ok(response.text().await?)
    }

    async fn apply_rate_limit(&self, url: &Url) {
        let host = url.host_str().unwrap_or("").to_string();
        let min_interval = Duration::from_millis(self.config.min_request_interval_ms);

        // Held across the sleep so concurrent requests to one host queue up.
        let mut rate_limiter = self.rate_limiter.lock().await;
        if let Some(last_request) = rate_limiter.get(&host) {
            let elapsed = last_request.elapsed();
            if elapsed < min_interval {
                let wait_time = min_interval - elapsed;
                debug!("Rate limiting {}: waiting {:?}", host, wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        rate_limiter.insert(host, Instant::now());
    }
}
