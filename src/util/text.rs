use std::borrow::Cow;

/// Returns true for bytes that are stripped from ingested text.
///
/// Tab, newline and carriage return are kept; they are folded into single
/// spaces later by [`clean_text`].
fn is_stripped_control(b: u8) -> bool {
    b == 0x7f || (b < 0x20 && b != 0x09 && b != 0x0a && b != 0x0d)
}

/// Strip ASCII control characters from text scraped off remote sources.
///
/// Removes 0x00-0x08, 0x0B-0x0C, 0x0E-0x1F and 0x7F. Returns
/// `Cow::Borrowed` when the input is already clean (the common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.bytes().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    // Control bytes are ASCII and never appear mid-codepoint, so filtering
    // chars below 0x80 by byte value is equivalent.
    Cow::Owned(
        s.chars()
            .filter(|&c| !(c.is_ascii() && is_stripped_control(c as u8)))
            .collect(),
    )
}

/// Normalize a scraped text field: strip control characters, collapse every
/// whitespace run (including newlines from HTML text nodes) to one space, and
/// trim both ends.
///
/// # Examples
///
/// ```
/// use amlwatch::util::clean_text;
///
/// assert_eq!(clean_text("  Treasury\n\t Sanctions  Network "), "Treasury Sanctions Network");
/// assert_eq!(clean_text("\u{7}\n  "), "");
/// ```
pub fn clean_text(s: &str) -> String {
    let stripped = strip_control_chars(s);
    let mut out = String::with_capacity(stripped.len());
    for word in stripped.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Truncate to at most `max_chars` characters without splitting a code point.
///
/// Used to bound the amount of article text sent to remote extractors.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(s[..byte_idx].to_string()),
        None => Cow::Borrowed(s),
    }
}
