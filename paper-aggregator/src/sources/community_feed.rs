use crate::config::SourceConfig;
use crate::fetcher::Fetcher;
use crate::traits::SourceAdapter;
use crate::types::{CrossReference, PaperRecord, PipelineError, RawPayload, Result, SourceId};
use crate::utils::{arxiv, dates, text};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyPaper {
    paper: Option<PaperInfo>,
    num_comments: Option<u64>,
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaperInfo {
    id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    authors: Vec<AuthorInfo>,
    summary: Option<String>,
    published_at: Option<String>,
    #[serde(default, rename = "ai_keywords")]
    ai_keywords: Vec<String>,
    upvotes: Option<u64>,
    github_repo: Option<String>,
    github_stars: Option<u64>,
    project_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorInfo {
    name: Option<String>,
}

/// Hugging Face "daily papers"-style JSON feed.
pub struct CommunityFeedAdapter {
    fetcher: Arc<Fetcher>,
}

impl CommunityFeedAdapter {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl SourceAdapter for CommunityFeedAdapter {
    async fn fetch(&self, config: &SourceConfig) -> Result<Vec<RawPayload>> {
        let query = [("limit", config.max_results.to_string())];
        let content = self.fetcher.fetch_text(&config.id, config.endpoint(), &query).await?;

        let payloads: Vec<RawPayload> = serde_json::from_str(&content)
            .map_err(|e| PipelineError::unavailable(&config.id, format!("expected a JSON array: {}", e)))?;

        info!("Community feed {} returned {} papers", config.id, payloads.len());
        Ok(payloads)
    }

    fn normalize(&self, config: &SourceConfig, payload: RawPayload) -> Result<PaperRecord> {
        let daily: DailyPaper = serde_json::from_value(payload.clone())
            .map_err(|e| PipelineError::malformed(&config.id, format!("unexpected payload shape: {}", e)))?;
        let paper = daily
            .paper
            .ok_or_else(|| PipelineError::malformed(&config.id, "payload has no paper object"))?;

        let native_id = paper
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PipelineError::malformed(&config.id, "paper has no id"))?;

        let title = paper
            .title
            .as_deref()
            .map(text::collapse_whitespace)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::malformed(&config.id, format!("{}: missing title", native_id)))?;

        let authors: Vec<String> = paper
            .authors
            .into_iter()
            .filter_map(|a| a.name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if authors.is_empty() {
            return Err(PipelineError::malformed(&config.id, format!("{}: missing authors", native_id)));
        }

        let published = paper
            .published_at
            .as_deref()
            .and_then(dates::parse_flexible)
            .ok_or_else(|| PipelineError::malformed(&config.id, format!("{}: missing published date", native_id)))?;

        let is_arxiv = arxiv::looks_like_id(&native_id);
        let cross_reference = if is_arxiv {
            let target = config
                .cross_reference_source
                .clone()
                .unwrap_or_else(|| SourceId::new("arxiv"));
            Some(CrossReference {
                source: target,
                native_id: arxiv::normalize_id(&native_id),
            })
        } else {
            None
        };

        debug!("Normalized community paper {} (arXiv: {})", native_id, is_arxiv);

        Ok(PaperRecord {
            source: config.id.clone(),
            title,
            authors,
            abstract_text: paper.summary.as_deref().map(text::collapse_whitespace).unwrap_or_default(),
            published,
            updated: None,
            primary_category: paper.ai_keywords.first().cloned(),
            tags: paper.ai_keywords,
            popularity: paper.upvotes,
            cross_reference,
            pdf_url: is_arxiv.then(|| format!("https://arxiv.org/pdf/{}", arxiv::normalize_id(&native_id))),
            landing_url: paper
                .project_page
                .filter(|page| !page.is_empty())
                .or_else(|| Some(format!("https://huggingface.co/papers/{}", native_id))),
            comment_count: daily.num_comments,
            github_repo: paper.github_repo.filter(|repo| !repo.is_empty()),
            github_stars: paper.github_stars,
            thumbnail_url: daily.thumbnail.filter(|url| !url.is_empty()),
            native_id,
            raw: payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn adapter() -> CommunityFeedAdapter {
        CommunityFeedAdapter::new(Arc::new(Fetcher::new(FetchConfig::default()).unwrap()))
    }

    fn payload() -> RawPayload {
        json!({
            "paper": {
                "id": "2511.00002",
                "title": "Agents that\n read papers",
                "authors": [{"name": "Grace Hopper", "hidden": false}, {"name": "Edsger Dijkstra"}],
                "summary": "We build agents.",
                "publishedAt": "2025-11-02T08:00:00.000Z",
                "ai_keywords": ["agents", "LLM"],
                "upvotes": 42,
                "githubRepo": "https://github.com/example/agents",
                "githubStars": 7
            },
            "numComments": 3,
            "thumbnail": "https://cdn.example/thumb.png"
        })
    }

    #[test]
    fn normalizes_daily_paper() {
        let config = SourceConfig::community_feed();
        let record = adapter().normalize(&config, payload()).unwrap();

        assert_eq!(record.source.as_str(), "hf_daily");
        assert_eq!(record.native_id, "2511.00002");
        assert_eq!(record.title, "Agents that read papers");
        assert_eq!(record.authors, vec!["Grace Hopper", "Edsger Dijkstra"]);
        assert_eq!(record.published, Utc.with_ymd_and_hms(2025, 11, 2, 8, 0, 0).unwrap());
        assert_eq!(record.tags, vec!["agents", "LLM"]);
        assert_eq!(record.primary_category.as_deref(), Some("agents"));
        assert_eq!(record.popularity, Some(42));
        assert_eq!(record.comment_count, Some(3));
        assert_eq!(record.landing_url.as_deref(), Some("https://huggingface.co/papers/2511.00002"));
        assert_eq!(
            record.cross_reference,
            Some(CrossReference {
                source: SourceId::new("arxiv"),
                native_id: "2511.00002".to_string(),
            })
        );
        assert_eq!(record.github_repo.as_deref(), Some("https://github.com/example/agents"));
        assert_eq!(record.github_stars, Some(7));
        assert_eq!(record.thumbnail_url.as_deref(), Some("https://cdn.example/thumb.png"));
        assert_eq!(record.raw["thumbnail"], "https://cdn.example/thumb.png");
    }

    #[test]
    fn optional_fields_degrade_to_absent() {
        let config = SourceConfig::community_feed();
        let record = adapter()
            .normalize(
                &config,
                json!({"paper": {
                    "id": "local-42",
                    "title": "No extras",
                    "authors": [{"name": "Solo"}],
                    "publishedAt": "2025-11-02"
                }}),
            )
            .unwrap();

        assert_eq!(record.popularity, None);
        assert!(record.tags.is_empty());
        assert_eq!(record.cross_reference, None);
        assert_eq!(record.pdf_url, None);
        assert_eq!(record.comment_count, None);
        assert_eq!(record.github_stars, None);
        assert_eq!(record.thumbnail_url, None);
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        let config = SourceConfig::community_feed();
        let mut no_title = payload();
        no_title["paper"]["title"] = json!(null);
        let mut no_authors = payload();
        no_authors["paper"]["authors"] = json!([]);
        let mut bad_date = payload();
        bad_date["paper"]["publishedAt"] = json!("last tuesday");

        for bad in [no_title, no_authors, bad_date, json!({"numComments": 1})] {
            let err = adapter().normalize(&config, bad).unwrap_err();
            assert!(matches!(err, PipelineError::MalformedRecord { .. }), "got {:?}", err);
        }
    }
}
