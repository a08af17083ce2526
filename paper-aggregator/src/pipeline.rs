use crate::aggregator::{PipelineResult, ResultAggregator, RunMetadata, SourceReport};
use crate::config::{MalformedPolicy, RunOptions, SourceConfig};
use crate::fetcher::Fetcher;
use crate::filter::{FilterEngine, ResolvedFilter};
use crate::llm_adapter::OllamaScoringOracle;
use crate::ranking::RankSelector;
use crate::scoring::{ScoreOutcome, ScoredCandidate, ScoringLimiter, ScoringOracleClient};
use crate::sources::SourceRegistry;
use crate::traits::{ScoringOracle, SourceAdapter};
use crate::types::{PaperRecord, PipelineError, Result, SourceId};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Fetching,
    Filtering,
    Scoring,
    Aggregating,
    Done,
    /// Only reached when the configuration is invalid.
    Failed,
}

/// What one source contributed before filtering.
struct SourceFetch {
    config: SourceConfig,
    report: SourceReport,
    records: Vec<PaperRecord>,
}

/// Runs Fetch → Filter → Rank → Aggregate once per call to [`run`](Self::run).
pub struct PipelineOrchestrator {
    options: RunOptions,
    registry: SourceRegistry,
    scoring: ScoringOracleClient,
    state: Arc<RwLock<RunState>>,
}

impl PipelineOrchestrator {
    /// The limiter is the only resource shared between concurrent scoring calls.
    pub fn new(
        options: RunOptions,
        registry: SourceRegistry,
        oracle: Arc<dyn ScoringOracle>,
        limiter: ScoringLimiter,
    ) -> Self {
        info!(
            "Creating pipeline with {} sources, oracle {}, {} scoring slots",
            registry.len(),
            oracle.oracle_name(),
            limiter.max_in_flight()
        );
        let scoring = ScoringOracleClient::new(oracle, limiter, options.oracle.clone());
        Self {
            options,
            registry,
            scoring,
            state: Arc::new(RwLock::new(RunState::Idle)),
        }
    }

    /// Network-backed pipeline: real source adapters and the Ollama oracle.
    pub fn from_options(options: RunOptions) -> Result<Self> {
        options.validate()?;
        let fetcher = Arc::new(Fetcher::new(options.fetch.clone())?);
        let registry = SourceRegistry::from_options(&options, fetcher)?;
        let oracle = Arc::new(OllamaScoringOracle::new(
            options.oracle.ollama.clone(),
            options.oracle.call_timeout(),
        )?);
        let limiter = ScoringLimiter::new(options.oracle.max_in_flight);
        Ok(Self::new(options, registry, oracle, limiter))
    }

    /// State reached by the most recent run.
    pub async fn state(&self) -> RunState {
        *self.state.read().await
    }

    async fn transition(&self, next: RunState) {
        let mut state = self.state.write().await;
        info!("Pipeline state {:?} -> {:?}", *state, next);
        *state = next;
    }

    pub async fn run(&self) -> Result<PipelineResult> {
        self.run_at(Utc::now()).await
    }

    /// Run with `now` as the instant relative date windows resolve against.
    ///
    /// Only `ConfigurationInvalid` is returned as an error; every other
    /// failure ends up in the per-source reports.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<PipelineResult> {
        self.transition(RunState::Idle).await;

        let plan = match self.plan(now) {
            Ok(plan) => plan,
            Err(e) => {
                error!("Refusing to run: {}", e);
                self.transition(RunState::Failed).await;
                return Err(e);
            }
        };

        let mut run = RunMetadata::start(now);
        let deadline = self.options.run_timeout().map(|timeout| Instant::now() + timeout);
        info!("Starting run {} over {} sources", run.run_id, plan.len());

        self.transition(RunState::Fetching).await;
        let fetches = join_all(plan.iter().map(|(config, adapter, _)| {
            let config = config.clone();
            let adapter = adapter.clone();
            async move {
                let source_id = config.id.clone();
                let rankable = config.is_rankable();
                match deadline {
                    Some(deadline) => match timeout_at(deadline, Self::fetch_source(adapter, config.clone())).await {
                        Ok(fetch) => fetch,
                        Err(_) => {
                            warn!("Run deadline reached while fetching {}", source_id);
                            let mut report = SourceReport::new(source_id, rankable);
                            report.attempted = true;
                            report.timed_out = true;
                            report.failure = Some("run timed out during fetch".to_string());
                            SourceFetch {
                                config,
                                report,
                                records: Vec::new(),
                            }
                        }
                    },
                    None => Self::fetch_source(adapter, config).await,
                }
            }
        }))
        .await;

        self.transition(RunState::Filtering).await;
        let mut reports = Vec::with_capacity(fetches.len());
        let mut candidates = Vec::new();
        let mut candidate_keys = HashSet::new();
        let mut unranked = Vec::new();
        for (fetch, (_, _, filter)) in fetches.into_iter().zip(plan.iter()) {
            let SourceFetch {
                config,
                mut report,
                records,
            } = fetch;
            run.timed_out |= report.timed_out;

            let outcome = FilterEngine::apply(records, filter);
            report.filtered_out = outcome.filtered_out();
            info!(
                "Source {}: {} kept, {} filtered out (date {}, popularity {}, tags {})",
                config.id,
                outcome.kept.len(),
                outcome.filtered_out(),
                outcome.rejected_by_date,
                outcome.rejected_by_popularity,
                outcome.rejected_by_tags
            );

            if config.is_rankable() {
                for record in outcome.kept {
                    // one oracle call per key
                    if candidate_keys.insert(record.key()) {
                        candidates.push(record);
                    } else {
                        debug!("Dropping repeated candidate {} before scoring", record.key());
                    }
                }
            } else {
                let mut kept = outcome.kept;
                let cap = config.filter.result_cap;
                if kept.len() > cap {
                    report.capped = kept.len() - cap;
                    kept.truncate(cap);
                }
                unranked.push((config.id.clone(), kept));
            }
            reports.push(report);
        }

        self.transition(RunState::Scoring).await;
        let (scored, scoring_timed_out) = self.score_candidates(candidates, deadline, &mut reports).await;
        run.timed_out |= scoring_timed_out;
        let ranked = RankSelector::select(scored, self.options.top_n);

        self.transition(RunState::Aggregating).await;
        let result = ResultAggregator::merge(run, reports, ranked, unranked);

        self.transition(RunState::Done).await;
        info!(
            "Run {} finished with {} entries{}",
            result.run_id,
            result.entries.len(),
            if result.timed_out { " (timed out)" } else { "" }
        );
        Ok(result)
    }

    /// Validate, pick adapters and resolve filters; nothing is fetched yet.
    fn plan(&self, now: DateTime<Utc>) -> Result<Vec<(SourceConfig, Arc<dyn SourceAdapter>, ResolvedFilter)>> {
        self.options.validate()?;
        self.options
            .enabled_sources()
            .map(|config| {
                let adapter = self.registry.get(&config.id).ok_or_else(|| {
                    PipelineError::invalid_config(format!("no adapter registered for source '{}'", config.id))
                })?;
                let filter = config.filter.resolve(now)?;
                Ok((config.clone(), adapter, filter))
            })
            .collect()
    }

    async fn fetch_source(adapter: Arc<dyn SourceAdapter>, config: SourceConfig) -> SourceFetch {
        let mut report = SourceReport::new(config.id.clone(), config.is_rankable());
        report.attempted = true;

        let payloads = match adapter.fetch(&config).await {
            Ok(payloads) => payloads,
            Err(e) => {
                warn!("Source {} failed: {}", config.id, e);
                report.failure = Some(e.to_string());
                return SourceFetch {
                    config,
                    report,
                    records: Vec::new(),
                };
            }
        };
        report.fetched = payloads.len();

        let mut records = Vec::with_capacity(payloads.len());
        for payload in payloads {
            match adapter.normalize(&config, payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    report.malformed += 1;
                    match config.malformed_policy {
                        MalformedPolicy::SkipRecord => {
                            debug!("Skipping payload from {}: {}", config.id, e);
                        }
                        MalformedPolicy::FailSource => {
                            warn!("Excluding source {} for this run: {}", config.id, e);
                            report.failure = Some(e.to_string());
                            records.clear();
                            break;
                        }
                    }
                }
            }
        }

        SourceFetch { config, report, records }
    }

    /// Score every candidate, keeping whatever finished before the deadline.
    async fn score_candidates(
        &self,
        candidates: Vec<PaperRecord>,
        deadline: Option<Instant>,
        reports: &mut [SourceReport],
    ) -> (Vec<ScoredCandidate>, bool) {
        let total = candidates.len();
        let mut per_source: HashMap<SourceId, usize> = HashMap::new();
        for record in &candidates {
            *per_source.entry(record.source.clone()).or_default() += 1;
        }
        let mut pending: FuturesUnordered<_> = candidates
            .into_iter()
            .enumerate()
            .map(|(index, record)| async move {
                let source = record.source.clone();
                (index, source, self.scoring.score(record).await)
            })
            .collect();

        let mut scored = Vec::new();
        let mut timed_out = false;
        loop {
            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                },
                None => pending.next().await,
            };
            let Some((index, source, outcome)) = next else {
                break;
            };

            let report = reports.iter_mut().find(|report| report.source == source);
            match outcome {
                ScoreOutcome::Scored(candidate) => {
                    if let Some(report) = report {
                        report.scored += 1;
                    }
                    scored.push((index, candidate));
                }
                ScoreOutcome::Excluded(exclusion) => {
                    if let Some(report) = report {
                        report.scoring_exclusions.push(exclusion);
                    }
                }
            }
        }

        if timed_out {
            let unfinished = pending.len();
            warn!("Run deadline reached with {} of {} candidates unscored", unfinished, total);
            // Dropping the stream cancels the remaining oracle calls.
            drop(pending);
            for report in reports.iter_mut() {
                let finished = report.scored + report.scoring_exclusions.len();
                if finished < per_source.get(&report.source).copied().unwrap_or(0) {
                    report.timed_out = true;
                }
            }
        }

        // Keep filter order going into ranking.
        scored.sort_by_key(|(index, _)| *index);
        (scored.into_iter().map(|(_, candidate)| candidate).collect(), timed_out)
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.options.enabled_sources().map(|source| source.id.clone()).collect()
    }
}
