use crate::types::{PipelineError, Result};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// One arXiv Atom entry, kept as the raw payload of an arXiv record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArxivEntry {
    pub id: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    pub links: Vec<ArxivLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArxivLink {
    pub href: String,
    pub rel: Option<String>,
    pub media_type: Option<String>,
    pub title: Option<String>,
}

impl ArxivEntry {
    pub fn pdf_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.title.as_deref() == Some("pdf") || link.media_type.as_deref() == Some("application/pdf"))
            .map(|link| link.href.as_str())
    }

    pub fn landing_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel.as_deref() == Some("alternate"))
            .map(|link| link.href.as_str())
    }
}

/// Parses arXiv API responses, dropping repeated entry ids within one response.
pub struct ArxivFeedParser {
    seen_ids: HashSet<String>,
}

impl Default for ArxivFeedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ArxivFeedParser {
    pub fn new() -> Self {
        Self {
            seen_ids: HashSet::new(),
        }
    }

    pub fn parse(&mut self, content: &str) -> Result<Vec<ArxivEntry>> {
        debug!("Parsing arXiv feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| PipelineError::Parse(format!("Failed to parse feed: {}", e)))?;

        let mut entries = Vec::new();
        for entry in feed.entries {
            // The API reports query errors as a feed with a single error entry.
            if entry.id.contains("/api/errors") {
                let message = entry.summary.map(|s| s.content).unwrap_or_default();
                return Err(PipelineError::Parse(format!("arXiv API error: {}", message.trim())));
            }
            if !self.seen_ids.insert(entry.id.clone()) {
                warn!("Skipping duplicate entry with id: {}", entry.id);
                continue;
            }
            entries.push(Self::parse_entry(entry));
        }

        info!("Parsed arXiv feed with {} entries", entries.len());
        Ok(entries)
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> ArxivEntry {
        ArxivEntry {
            id: entry.id,
            title: entry.title.map(|t| t.content),
            authors: entry.authors.into_iter().map(|a| a.name).collect(),
            summary: entry.summary.map(|s| s.content),
            published: entry.published.map(|dt| dt.with_timezone(&Utc)),
            updated: entry.updated.map(|dt| dt.with_timezone(&Utc)),
            categories: entry.categories.into_iter().map(|c| c.term).collect(),
            links: entry
                .links
                .into_iter()
                .map(|link| ArxivLink {
                    href: link.href,
                    rel: link.rel,
                    media_type: link.media_type,
                    title: link.title,
                })
                .collect(),
        }
    }
}
