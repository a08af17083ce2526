pub mod arxiv;
pub mod community_feed;

pub use arxiv::ArxivAdapter;
pub use community_feed::CommunityFeedAdapter;

use crate::config::{RunOptions, SourceKind};
use crate::fetcher::Fetcher;
use crate::traits::SourceAdapter;
use crate::types::{PipelineError, Result, SourceId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Adapters keyed by configured source id.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<SourceId, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<SourceId>, adapter: Arc<dyn SourceAdapter>) {
        let id = id.into();
        debug!("Registered adapter for source {}", id);
        self.adapters.insert(id, adapter);
    }

    pub fn with(mut self, id: impl Into<SourceId>, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(id, adapter);
        self
    }

    pub fn get(&self, id: &SourceId) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// One adapter per enabled source, chosen by its configured kind.
    pub fn from_options(options: &RunOptions, fetcher: Arc<Fetcher>) -> Result<Self> {
        let mut registry = Self::new();
        for source in options.enabled_sources() {
            let adapter: Arc<dyn SourceAdapter> = match source.kind {
                SourceKind::Arxiv => Arc::new(ArxivAdapter::new(fetcher.clone())),
                SourceKind::CommunityFeed => Arc::new(CommunityFeedAdapter::new(fetcher.clone())),
            };
            registry.register(source.id.clone(), adapter);
        }
        if registry.is_empty() {
            return Err(PipelineError::invalid_config("no sources enabled"));
        }
        Ok(registry)
    }
}
