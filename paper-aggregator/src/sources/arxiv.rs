use crate::config::SourceConfig;
use crate::fetcher::Fetcher;
use crate::parser::{ArxivEntry, ArxivFeedParser};
use crate::traits::SourceAdapter;
use crate::types::{PaperRecord, PipelineError, RawPayload, Result};
use crate::utils::{arxiv, text};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// arXiv Atom API source.
pub struct ArxivAdapter {
    fetcher: Arc<Fetcher>,
}

impl ArxivAdapter {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    /// `cat:A OR cat:B`, falling back to the filter tags, then to everything.
    pub fn search_query(config: &SourceConfig) -> String {
        let categories = if config.query_categories.is_empty() {
            &config.filter.tags.tags
        } else {
            &config.query_categories
        };

        if categories.is_empty() {
            return "all:*".to_string();
        }
        categories
            .iter()
            .map(|category| format!("cat:{}", category))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    async fn fetch(&self, config: &SourceConfig) -> Result<Vec<RawPayload>> {
        let query = [
            ("search_query", Self::search_query(config)),
            ("start", "0".to_string()),
            ("max_results", config.max_results.to_string()),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ];

        let content = self.fetcher.fetch_text(&config.id, config.endpoint(), &query).await?;
        let entries = ArxivFeedParser::new()
            .parse(&content)
            .map_err(|e| PipelineError::unavailable(&config.id, e.to_string()))?;

        info!("arXiv source {} returned {} entries", config.id, entries.len());

        entries
            .into_iter()
            .map(|entry| serde_json::to_value(entry).map_err(PipelineError::from))
            .collect()
    }

    fn normalize(&self, config: &SourceConfig, payload: RawPayload) -> Result<PaperRecord> {
        let entry: ArxivEntry = serde_json::from_value(payload.clone())
            .map_err(|e| PipelineError::malformed(&config.id, format!("unexpected payload shape: {}", e)))?;

        let native_id = arxiv::normalize_id(&entry.id);
        if native_id.is_empty() {
            return Err(PipelineError::malformed(&config.id, "entry has no id"));
        }

        let title = entry
            .title
            .as_deref()
            .map(text::collapse_whitespace)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::malformed(&config.id, format!("{}: missing title", native_id)))?;

        let authors: Vec<String> = entry
            .authors
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if authors.is_empty() {
            return Err(PipelineError::malformed(&config.id, format!("{}: missing authors", native_id)));
        }

        let published = entry
            .published
            .ok_or_else(|| PipelineError::malformed(&config.id, format!("{}: missing published date", native_id)))?;

        debug!("Normalized arXiv entry {}", native_id);

        Ok(PaperRecord {
            source: config.id.clone(),
            title,
            authors,
            abstract_text: entry.summary.as_deref().map(text::collapse_whitespace).unwrap_or_default(),
            published,
            updated: entry.updated,
            primary_category: entry.categories.first().cloned(),
            tags: entry.categories.clone(),
            popularity: None,
            cross_reference: None,
            pdf_url: entry.pdf_link().map(str::to_string),
            landing_url: entry
                .landing_link()
                .map(str::to_string)
                .or_else(|| Some(format!("https://arxiv.org/abs/{}", native_id))),
            comment_count: None,
            github_repo: None,
            github_stars: None,
            thumbnail_url: None,
            native_id,
            raw: payload,
        })
    }
}
