use backoff::ExponentialBackoff;
use std::time::Duration;

/// Backoff schedule shared by fetch and oracle retries. Attempt counting is
/// left to the caller, so elapsed time never ends the schedule.
pub fn retry_backoff(initial_delay_ms: u64) -> ExponentialBackoff {
    let initial = Duration::from_millis(initial_delay_ms.max(1));
    ExponentialBackoff {
        current_interval: initial,
        initial_interval: initial,
        max_interval: initial * 32,
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Text processing utilities
pub mod text {
    /// Collapse runs of whitespace (Atom titles and abstracts are hard-wrapped).
    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Truncate to at most `max_chars` characters, breaking at a word when possible.
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let truncated: String = text.chars().take(max_chars).collect();
        match truncated.rfind(' ') {
            Some(last_space) if last_space > 0 => format!("{}...", &truncated[..last_space]),
            _ => format!("{}...", truncated),
        }
    }

    /// Strip a surrounding Markdown code fence, with or without a language tag.
    pub fn strip_code_fence(text: &str) -> &str {
        let trimmed = text.trim();
        let Some(start) = trimmed.find("```") else {
            return trimmed;
        };
        let after_open = &trimmed[start + 3..];
        // skip the language tag line, e.g. ```json
        let body = match after_open.find('\n') {
            Some(newline) if !after_open[..newline].trim().contains(char::is_whitespace) => &after_open[newline + 1..],
            _ => after_open,
        };
        match body.find("```") {
            Some(end) => body[..end].trim(),
            None => body.trim(),
        }
    }
}

/// arXiv identifier utilities
pub mod arxiv {
    /// Bare arXiv id: no URL, no `arXiv:` prefix, no `.pdf`, no version suffix.
    pub fn normalize_id(raw: &str) -> String {
        let mut id = raw.trim();
        for marker in ["/abs/", "/pdf/"] {
            if let Some(pos) = id.find(marker) {
                id = &id[pos + marker.len()..];
            }
        }
        if let Some(rest) = id.strip_prefix("arXiv:").or_else(|| id.strip_prefix("arxiv:")) {
            id = rest;
        }
        id = id.strip_suffix(".pdf").unwrap_or(id);
        strip_version(id).to_string()
    }

    fn strip_version(id: &str) -> &str {
        if let Some(pos) = id.rfind('v') {
            let (head, version) = id.split_at(pos);
            let digits = &version[1..];
            if !head.is_empty() && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return head;
            }
        }
        id
    }

    /// `YYMM.NNNN[N]` or old-style `archive/YYMMNNN`, optionally versioned.
    pub fn looks_like_id(candidate: &str) -> bool {
        let id = strip_version(candidate.trim());
        if let Some((yymm, number)) = id.split_once('.') {
            if yymm.len() == 4
                && yymm.chars().all(|c| c.is_ascii_digit())
                && (4..=5).contains(&number.len())
                && number.chars().all(|c| c.is_ascii_digit())
            {
                return true;
            }
        }
        if let Some((archive, number)) = id.split_once('/') {
            return !archive.is_empty()
                && archive.chars().all(|c| c.is_ascii_alphabetic() || c == '-' || c == '.')
                && number.len() == 7
                && number.chars().all(|c| c.is_ascii_digit());
        }
        false
    }
}

/// Date utilities
pub mod dates {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    /// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare `YYYY-MM-DD` (midnight UTC).
    pub fn parse_flexible(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Some(Utc.from_utc_datetime(&naive));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn normalizes_arxiv_ids() {
        assert_eq!(arxiv::normalize_id("http://arxiv.org/abs/2501.01234v2"), "2501.01234");
        assert_eq!(arxiv::normalize_id("https://arxiv.org/pdf/2501.01234v1.pdf"), "2501.01234");
        assert_eq!(arxiv::normalize_id("arXiv:2501.01234"), "2501.01234");
        assert_eq!(arxiv::normalize_id("hep-th/9901001v3"), "hep-th/9901001");
        assert_eq!(arxiv::normalize_id("2501.01234"), "2501.01234");
    }

    #[test]
    fn recognizes_arxiv_ids() {
        assert!(arxiv::looks_like_id("2501.01234"));
        assert!(arxiv::looks_like_id("2501.0123v2"));
        assert!(arxiv::looks_like_id("math.GT/0309136"));
        assert!(!arxiv::looks_like_id("deepseek-ai/janus"));
        assert!(!arxiv::looks_like_id("paper-42"));
    }

    #[test]
    fn parses_source_dates() {
        let expected = Utc.with_ymd_and_hms(2025, 11, 2, 0, 0, 0).unwrap();
        assert_eq!(dates::parse_flexible("2025-11-02"), Some(expected));
        assert_eq!(dates::parse_flexible("2025-11-02T00:00:00.000Z"), Some(expected));
        assert_eq!(dates::parse_flexible("2025-11-02T02:00:00+02:00"), Some(expected));
        assert_eq!(dates::parse_flexible("yesterday"), None);
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(text::strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(text::strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(text::strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn collapses_and_truncates() {
        assert_eq!(text::collapse_whitespace("Sparse\n   routing  "), "Sparse routing");
        assert_eq!(text::truncate_chars("one two three", 9), "one two...");
        assert_eq!(text::truncate_chars("short", 9), "short");
    }
}
