pub mod types;
pub mod config;
pub mod traits;
pub mod utils;
pub mod fetcher;
pub mod parser;
pub mod sources;
pub mod filter;
pub mod scoring;
pub mod llm_adapter;
pub mod ranking;
pub mod aggregator;
pub mod pipeline;
pub mod digest;

pub use types::*;
pub use config::{FetchConfig, MalformedPolicy, OllamaConfig, OracleConfig, RunOptions, ScoreWeights, SourceConfig, SourceKind};
pub use traits::{RawScore, ScoringOracle, SourceAdapter};
pub use fetcher::Fetcher;
pub use parser::{ArxivEntry, ArxivFeedParser};
pub use sources::{ArxivAdapter, CommunityFeedAdapter, SourceRegistry};
pub use filter::{DateRange, DateWindowSpec, FilterEngine, FilterOutcome, FilterSpec, ResolvedFilter, TagMatch, TagPredicate};
pub use scoring::{NoveltyScore, ScoredCandidate, ScoringExclusion, ScoringLimiter, ScoringOracleClient};
pub use llm_adapter::{MockScoringOracle, OllamaScoringOracle};
pub use ranking::RankSelector;
pub use aggregator::{DuplicateNote, PipelineResult, ResultAggregator, ResultEntry, SourceReport};
pub use pipeline::{PipelineOrchestrator, RunState};
pub use digest::PaperDigestModel;
