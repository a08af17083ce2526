use crate::types::{PaperRecord, PipelineError, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Either an explicit `[from, to]` date range or the last N days before now.
///
/// Exactly one of `from` and `last_days` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindowSpec {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub last_days: Option<u32>,
}

impl Default for DateWindowSpec {
    fn default() -> Self {
        Self::last_days(1)
    }
}

impl DateWindowSpec {
    pub fn explicit(from: NaiveDate, to: Option<NaiveDate>) -> Self {
        Self {
            from: Some(from),
            to,
            last_days: None,
        }
    }

    pub fn last_days(days: u32) -> Self {
        Self {
            from: None,
            to: None,
            last_days: Some(days),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match (self.from, self.to, self.last_days) {
            (Some(_), _, Some(_)) | (None, Some(_), Some(_)) => Err(PipelineError::invalid_config(
                "date window sets both an explicit range and last_days",
            )),
            (None, Some(_), None) => Err(PipelineError::invalid_config("date window has 'to' without 'from'")),
            (None, None, None) => Err(PipelineError::invalid_config("date window sets neither a range nor last_days")),
            (None, None, Some(0)) => Err(PipelineError::invalid_config("last_days must be at least 1")),
            (Some(from), Some(to), None) if from > to => Err(PipelineError::invalid_config(format!(
                "date window starts after it ends ({} > {})",
                from, to
            ))),
            _ => Ok(()),
        }
    }

    /// Fixes the window against `now`. Explicit dates cover whole UTC days.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<DateRange> {
        self.validate()?;
        let range = match (self.from, self.to, self.last_days) {
            (Some(from), to, None) => {
                let start = Utc.from_utc_datetime(&from.and_time(NaiveTime::MIN));
                let end = match to {
                    Some(to) => Utc.from_utc_datetime(&to.and_time(end_of_day())),
                    None => now,
                };
                if start > end {
                    return Err(PipelineError::invalid_config(format!(
                        "date window starts after the run start ({} > {})",
                        from, now
                    )));
                }
                DateRange { from: start, to: end }
            }
            (None, None, Some(days)) => DateRange {
                from: now - Duration::days(i64::from(days)),
                to: now,
            },
            _ => return Err(PipelineError::invalid_config("date window is incomplete")),
        };
        Ok(range)
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN)
}

/// Concrete, inclusive instant range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant <= self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMatch {
    #[serde(alias = "AND", alias = "and", alias = "all")]
    AllOf,
    #[default]
    #[serde(alias = "OR", alias = "or", alias = "any")]
    AnyOf,
    #[serde(alias = "NOT", alias = "not", alias = "none")]
    NoneOf,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TagPredicate {
    pub mode: TagMatch,
    pub tags: Vec<String>,
}

impl TagPredicate {
    pub fn new(mode: TagMatch, tags: &[&str]) -> Self {
        Self {
            mode,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// An empty tag list never rejects.
    pub fn matches(&self, record: &PaperRecord) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        match self.mode {
            TagMatch::AllOf => self.tags.iter().all(|t| record.has_tag(t)),
            TagMatch::AnyOf => self.tags.iter().any(|t| record.has_tag(t)),
            TagMatch::NoneOf => !self.tags.iter().any(|t| record.has_tag(t)),
        }
    }
}

/// Per-source filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub date_window: DateWindowSpec,
    pub tags: TagPredicate,
    /// 0 disables the popularity stage.
    pub min_popularity: u64,
    /// Upper bound on results kept for sources that are not rank-selected.
    pub result_cap: usize,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            date_window: DateWindowSpec::default(),
            tags: TagPredicate::default(),
            min_popularity: 0,
            result_cap: 50,
        }
    }
}

impl FilterSpec {
    pub fn validate(&self) -> Result<()> {
        self.date_window.validate()
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> Result<ResolvedFilter> {
        Ok(ResolvedFilter {
            window: self.date_window.resolve(now)?,
            tags: self.tags.clone(),
            min_popularity: self.min_popularity,
        })
    }
}

/// A filter whose relative window has been fixed once for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFilter {
    pub window: DateRange,
    pub tags: TagPredicate,
    pub min_popularity: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    DateWindow,
    Popularity,
    Tags,
}

#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub kept: Vec<PaperRecord>,
    pub rejected_by_date: usize,
    pub rejected_by_popularity: usize,
    pub rejected_by_tags: usize,
}

impl FilterOutcome {
    pub fn filtered_out(&self) -> usize {
        self.rejected_by_date + self.rejected_by_popularity + self.rejected_by_tags
    }
}

pub struct FilterEngine;

impl FilterEngine {
    /// First stage that rejects the record, or `None` when it passes all of them.
    pub fn rejecting_stage(record: &PaperRecord, filter: &ResolvedFilter) -> Option<FilterStage> {
        if !filter.window.contains(record.published) {
            return Some(FilterStage::DateWindow);
        }
        if filter.min_popularity > 0 && !matches!(record.popularity, Some(p) if p >= filter.min_popularity) {
            return Some(FilterStage::Popularity);
        }
        if !filter.tags.matches(record) {
            return Some(FilterStage::Tags);
        }
        None
    }

    /// Keeps passing records in their original order.
    pub fn apply(records: Vec<PaperRecord>, filter: &ResolvedFilter) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for record in records {
            match Self::rejecting_stage(&record, filter) {
                None => outcome.kept.push(record),
                Some(stage) => {
                    debug!("Filtered out {} at {:?}", record.key(), stage);
                    match stage {
                        FilterStage::DateWindow => outcome.rejected_by_date += 1,
                        FilterStage::Popularity => outcome.rejected_by_popularity += 1,
                        FilterStage::Tags => outcome.rejected_by_tags += 1,
                    }
                }
            }
        }
        outcome
    }
}
