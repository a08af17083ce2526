use crate::scoring::{NoveltyScore, ScoredCandidate, ScoringExclusion};
use crate::types::{InputItem, PaperRecord, RecordKey, SourceId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-source run metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceReport {
    pub source: SourceId,
    pub rankable: bool,
    pub attempted: bool,
    pub fetched: usize,
    pub malformed: usize,
    pub filtered_out: usize,
    /// Records dropped by the result cap of a non-ranked source.
    pub capped: usize,
    pub scored: usize,
    pub scoring_exclusions: Vec<ScoringExclusion>,
    pub selected: usize,
    pub failure: Option<String>,
    pub timed_out: bool,
}

impl SourceReport {
    pub fn new(source: SourceId, rankable: bool) -> Self {
        Self {
            source,
            rankable,
            ..Self::default()
        }
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry {
    pub record: PaperRecord,
    /// Present for entries that went through ranking.
    pub score: Option<NoveltyScore>,
    pub reasoning: Option<String>,
}

impl ResultEntry {
    pub fn is_ranked(&self) -> bool {
        self.score.is_some()
    }
}

/// A record dropped because an earlier entry already claimed its identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateNote {
    pub dropped: RecordKey,
    pub kept: RecordKey,
}

/// Final, ordered output of one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub timed_out: bool,
    pub entries: Vec<ResultEntry>,
    pub sources: Vec<SourceReport>,
    pub duplicates: Vec<DuplicateNote>,
}

impl PipelineResult {
    pub fn records(&self) -> impl Iterator<Item = &PaperRecord> {
        self.entries.iter().map(|entry| &entry.record)
    }

    pub fn keys(&self) -> Vec<RecordKey> {
        self.records().map(PaperRecord::key).collect()
    }

    pub fn report(&self, source: &SourceId) -> Option<&SourceReport> {
        self.sources.iter().find(|report| &report.source == source)
    }

    pub fn scoring_exclusions(&self) -> impl Iterator<Item = &ScoringExclusion> {
        self.sources.iter().flat_map(|report| report.scoring_exclusions.iter())
    }

    /// Hand-off to downstream enrichment/summarization, in result order.
    pub fn to_input_items(&self) -> Vec<InputItem> {
        self.records().map(InputItem::from).collect()
    }
}

/// Identity of the run, fixed when it starts.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub timed_out: bool,
}

impl RunMetadata {
    pub fn start(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            timed_out: false,
        }
    }
}

pub struct ResultAggregator;

impl ResultAggregator {
    /// Ranked entries first, then each non-ranked source in the order given.
    ///
    /// An entry claims its own key and its cross-reference key; a later entry
    /// whose own key or cross-reference key is already claimed is dropped.
    pub fn merge(
        run: RunMetadata,
        mut reports: Vec<SourceReport>,
        ranked: Vec<ScoredCandidate>,
        unranked: Vec<(SourceId, Vec<PaperRecord>)>,
    ) -> PipelineResult {
        let concatenated = ranked
            .into_iter()
            .map(|candidate| ResultEntry {
                record: candidate.record,
                score: Some(candidate.score),
                reasoning: candidate.reasoning,
            })
            .chain(unranked.into_iter().flat_map(|(_, records)| {
                records.into_iter().map(|record| ResultEntry {
                    record,
                    score: None,
                    reasoning: None,
                })
            }));

        let mut claimed: HashMap<RecordKey, RecordKey> = HashMap::new();
        let mut entries = Vec::new();
        let mut duplicates = Vec::new();

        for entry in concatenated {
            let key = entry.record.key();
            let cross_key = entry.record.cross_reference.as_ref().map(|x| x.key());

            let owner = claimed
                .get(&key)
                .or_else(|| cross_key.as_ref().and_then(|k| claimed.get(k)))
                .cloned();
            if let Some(kept) = owner {
                debug!("Dropping {} as a duplicate of {}", key, kept);
                duplicates.push(DuplicateNote { dropped: key, kept });
                continue;
            }

            claimed.insert(key.clone(), key.clone());
            if let Some(cross_key) = cross_key {
                claimed.entry(cross_key).or_insert_with(|| key.clone());
            }
            entries.push(entry);
        }

        for report in &mut reports {
            report.selected = entries.iter().filter(|e| e.record.source == report.source).count();
        }

        info!(
            "Aggregated {} entries ({} duplicates dropped) from {} sources",
            entries.len(),
            duplicates.len(),
            reports.len()
        );

        PipelineResult {
            run_id: run.run_id,
            started_at: run.started_at,
            finished_at: Utc::now(),
            timed_out: run.timed_out,
            entries,
            sources: reports,
            duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoreWeights;
    use crate::traits::RawScore;
    use crate::types::CrossReference;
    use chrono::TimeZone;

    fn record(source: &str, id: &str, cross: Option<(&str, &str)>) -> PaperRecord {
        PaperRecord {
            source: SourceId::new(source),
            native_id: id.to_string(),
            title: format!("{} {}", source, id),
            authors: vec!["A. Author".to_string()],
            abstract_text: String::new(),
            published: Utc.with_ymd_and_hms(2025, 11, 2, 0, 0, 0).unwrap(),
            updated: None,
            primary_category: None,
            tags: Vec::new(),
            popularity: None,
            cross_reference: cross.map(|(s, n)| CrossReference {
                source: SourceId::new(s),
                native_id: n.to_string(),
            }),
            pdf_url: None,
            landing_url: None,
            comment_count: None,
            github_repo: None,
            github_stars: None,
            thumbnail_url: None,
            raw: serde_json::Value::Null,
        }
    }

    fn scored(record: PaperRecord) -> ScoredCandidate {
        ScoredCandidate {
            record,
            score: NoveltyScore::compute(&RawScore::new(8.0, 8.0, 8.0), &ScoreWeights::default()).unwrap(),
            reasoning: None,
        }
    }

    fn reports() -> Vec<SourceReport> {
        vec![
            SourceReport::new(SourceId::new("arxiv"), true),
            SourceReport::new(SourceId::new("hf_daily"), false),
        ]
    }

    fn run() -> RunMetadata {
        RunMetadata::start(Utc::now())
    }

    #[test]
    fn ranked_entries_come_first() {
        let result = ResultAggregator::merge(
            run(),
            reports(),
            vec![scored(record("arxiv", "1", None)), scored(record("arxiv", "2", None))],
            vec![(SourceId::new("hf_daily"), vec![record("hf_daily", "x", None)])],
        );

        let keys: Vec<String> = result.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["arxiv:1", "arxiv:2", "hf_daily:x"]);
        assert!(result.entries[0].is_ranked());
        assert!(!result.entries[2].is_ranked());
        assert_eq!(result.report(&SourceId::new("arxiv")).unwrap().selected, 2);
        assert_eq!(result.report(&SourceId::new("hf_daily")).unwrap().selected, 1);
    }

    #[test]
    fn cross_referenced_mirror_is_dropped() {
        let result = ResultAggregator::merge(
            run(),
            reports(),
            vec![scored(record("arxiv", "2511.00002", None))],
            vec![(
                SourceId::new("hf_daily"),
                vec![
                    record("hf_daily", "2511.00002", Some(("arxiv", "2511.00002"))),
                    record("hf_daily", "2511.00003", Some(("arxiv", "2511.00003"))),
                ],
            )],
        );

        assert_eq!(result.entries.len(), 2);
        assert_eq!(
            result.duplicates,
            vec![DuplicateNote {
                dropped: RecordKey::new("hf_daily", "2511.00002"),
                kept: RecordKey::new("arxiv", "2511.00002"),
            }]
        );
    }

    #[test]
    fn dedup_is_symmetric() {
        // The mirror comes first, so the arXiv record it points at is the duplicate.
        let result = ResultAggregator::merge(
            run(),
            reports(),
            vec![scored(record("hf_daily", "2511.00002", Some(("arxiv", "2511.00002"))))],
            vec![(SourceId::new("arxiv"), vec![record("arxiv", "2511.00002", None)])],
        );

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.duplicates[0].dropped, RecordKey::new("arxiv", "2511.00002"));
    }

    #[test]
    fn equal_native_ids_without_cross_reference_are_distinct() {
        let result = ResultAggregator::merge(
            run(),
            reports(),
            vec![scored(record("arxiv", "42", None))],
            vec![(SourceId::new("hf_daily"), vec![record("hf_daily", "42", None)])],
        );

        assert_eq!(result.entries.len(), 2);
        assert!(result.duplicates.is_empty());
    }

    #[test]
    fn no_duplicate_keys_in_result() {
        let result = ResultAggregator::merge(
            run(),
            reports(),
            vec![scored(record("arxiv", "1", None))],
            vec![(
                SourceId::new("hf_daily"),
                vec![
                    record("hf_daily", "a", None),
                    record("hf_daily", "a", None),
                    record("hf_daily", "b", Some(("arxiv", "1"))),
                ],
            )],
        );

        let mut keys = result.keys();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
        assert_eq!(result.duplicates.len(), 2);
    }
}
