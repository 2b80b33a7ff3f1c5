//! Text cleanup for extracted schedule fields
//!
//! Titles and descriptions pulled from markup tend to carry zero-width
//! characters, stray control characters, undecoded entities and ragged
//! whitespace. Every strategy funnels its text through [`sanitize_text`]
//! before handing entries to the normalizer.

use regex::Regex;
use std::sync::LazyLock;

use crate::utils::normalize_whitespace;

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static SCRIPT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>").unwrap());

/// Sanitize a single-line text field (title, description)
///
/// Applies, in order: zero-width removal, control-character removal, HTML
/// entity decoding, whitespace collapsing.
pub fn sanitize_text(text: &str) -> String {
    let mut result = remove_zero_width(text);
    result = remove_control_chars(&result);
    result = html_escape::decode_html_entities(&result).into_owned();
    normalize_whitespace(&result)
}

/// Strip markup from a document fragment, keeping line structure
///
/// Script/style blocks are dropped entirely, remaining tags become spaces
/// and entities are decoded. Newlines survive so line-oriented scanning
/// still works on the result.
pub fn strip_markup(fragment: &str) -> String {
    let without_blocks = SCRIPT_REGEX.replace_all(fragment, "\n");
    let without_tags = TAG_REGEX.replace_all(&without_blocks, " ");
    let decoded = html_escape::decode_html_entities(&without_tags).into_owned();
    remove_zero_width(&decoded)
}

/// Remove zero-width spaces and similar invisible characters
pub fn remove_zero_width(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(*c,
                '\u{200B}'..='\u{200F}' |
                '\u{2028}'..='\u{202F}' |
                '\u{FEFF}'
            )
        })
        .collect()
}

/// Remove control characters except newline and tab
pub fn remove_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_text() {
        let dirty = "Thời\u{200B}sự  19h &amp; b\u{0000}ản tin ";
        assert_eq!(sanitize_text(dirty), "Thờisự 19h & bản tin");
    }

    #[test]
    fn test_sanitize_collapses_newlines() {
        assert_eq!(sanitize_text("Phim\ntruyện"), "Phim truyện");
    }

    #[test]
    fn test_strip_markup_keeps_lines() {
        let html = "<ul>\n<li><b>08:00</b> News</li>\n<li>09:00 Weather</li>\n</ul>";
        let text = strip_markup(html);
        assert!(text.contains("08:00"));
        assert!(text.contains("News"));
        assert!(!text.contains('<'));
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_strip_markup_drops_script_blocks() {
        let html = "before<script>var t = \"12:00 fake\";</script>after";
        let text = strip_markup(html);
        assert!(!text.contains("12:00"));
        assert!(text.contains("before"));
        assert!(text.contains("after"));
    }

    #[test]
    fn test_strip_markup_decodes_entities() {
        let text = strip_markup("Tom &amp; Jerry");
        assert_eq!(text.trim(), "Tom & Jerry");
    }

    #[test]
    fn test_remove_zero_width() {
        let text = "a\u{200B}b\u{FEFF}c";
        assert_eq!(remove_zero_width(text), "abc");
    }

    #[test]
    fn test_remove_control_chars() {
        let text = "Hello\x00World\x07\nNewline";
        let clean = remove_control_chars(text);
        assert!(!clean.contains('\x00'));
        assert!(clean.contains('\n'));
    }
}
