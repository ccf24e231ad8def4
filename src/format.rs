use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use scraper::Html;

const ELLIPSIS: &str = "...";

/// Remove markup and decode entities, keeping only the text content.
pub fn strip_html(input: &str) -> String {
    if !input.contains('<') && !input.contains('&') {
        return input.trim().to_string();
    }
    let fragment = Html::parse_fragment(input);
    let text: String = fragment.root_element().text().collect();
    text.trim().to_string()
}

/// Cut `text` to at most `max_chars` characters, ending in "..." when shortened.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Parse the timestamp formats the LMS and backend emit. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// "Mar 7" style label.
pub fn short_date(dt: &DateTime<Utc>) -> String {
    dt.format("%b %-d").to_string()
}
