use crate::scoring::ScoredCandidate;
use std::cmp::Ordering;
use tracing::info;

pub struct RankSelector;

impl RankSelector {
    /// Total desc, then published desc, then native id asc.
    pub fn compare(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
        b.score
            .total()
            .total_cmp(&a.score.total())
            .then_with(|| b.record.published.cmp(&a.record.published))
            .then_with(|| a.record.native_id.cmp(&b.record.native_id))
    }

    /// Sort and keep the best `top_n`; `top_n <= 0` keeps nothing.
    pub fn select(mut scored: Vec<ScoredCandidate>, top_n: i64) -> Vec<ScoredCandidate> {
        if top_n <= 0 {
            return Vec::new();
        }
        scored.sort_by(Self::compare);
        scored.truncate(usize::try_from(top_n).unwrap_or(usize::MAX));

        for (i, candidate) in scored.iter().take(5).enumerate() {
            info!(
                "  #{}: {} (score: {:.1})",
                i + 1,
                crate::utils::text::truncate_chars(&candidate.record.title, 60),
                candidate.score.total()
            );
        }
        scored
    }
}
