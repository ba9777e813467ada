//! Turns heterogeneous [`RawEntry`] values into uniform [`NewArticle`] records.

use chrono::{DateTime, NaiveDate};

use crate::fetch::RawEntry;
use crate::storage::NewArticle;
use crate::util::clean_text;

/// Day formats seen on listing pages, after RFC 3339 and RFC 2822.
const DAY_FORMATS: [&str; 4] = ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%m/%d/%Y"];

/// Normalize one raw entry for `source`.
///
/// Returns `None` when the entry has no usable title or link; such entries
/// are skipped silently. The date is the first non-empty timestamp, passed
/// through unchanged. Content is the first non-empty text, falling back to
/// the title so it is never empty.
pub fn normalize(entry: RawEntry, source: &str) -> Option<NewArticle> {
    let title = entry.title.as_deref().map(clean_text).filter(|t| !t.is_empty())?;
    let url = entry
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())?
        .to_string();

    let published_at = entry
        .timestamps
        .iter()
        .map(|t| t.trim())
        .find(|t| !t.is_empty())
        .map(str::to_string);

    let content = entry
        .texts
        .iter()
        .map(|t| t.trim())
        .find(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| title.clone());

    Some(NewArticle {
        source: source.to_string(),
        title,
        url,
        published_at,
        content,
    })
}

/// Calendar day of a source-provided date string, when it is in a format
/// we recognize. Stored dates stay verbatim; this is only for comparisons.
pub fn published_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.date_naive());
    }
    DAY_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// First non-empty timestamp of an entry, as [`normalize`] would store it.
pub(crate) fn entry_date(entry: &RawEntry) -> Option<NaiveDate> {
    entry
        .timestamps
        .iter()
        .map(|t| t.trim())
        .find(|t| !t.is_empty())
        .and_then(published_date)
}
