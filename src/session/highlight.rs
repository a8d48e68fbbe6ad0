//! Emphasis marking for query occurrences in response text.

/// Opening tag wrapped around each matched occurrence.
pub const MARK_OPEN: &str =
    r#"<mark style="background-color: #ffeb3b; padding: 0.1em 0.2em; border-radius: 3px;">"#;
/// Closing tag wrapped around each matched occurrence.
pub const MARK_CLOSE: &str = "</mark>";

/// Wrap every literal occurrence of `needle` in `text` with the emphasis marker.
///
/// Matching is case-sensitive and non-overlapping, left to right. When the
/// needle does not occur (or is empty), the text is returned unchanged.
pub fn emphasize_occurrences(text: &str, needle: &str) -> String {
    if needle.is_empty() {
        return text.to_string();
    }
    let marked = format!("{MARK_OPEN}{needle}{MARK_CLOSE}");
    text.replace(needle, &marked)
}
