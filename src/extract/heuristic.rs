//! Generic heuristic extraction
//!
//! Last-resort strategy for pages with no stable schema: locate the
//! channel's identifying text in the raw document (falling back to the
//! document's leading bytes), take a bounded window of surrounding text,
//! strip markup, and scan for `time title` pairs. The time pattern accepts
//! hour 00-23 and minute 00-59 separated by `:` or `.`; the title is up to
//! ~200 characters of trailing text on the same line.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use crate::channels::ChannelDescriptor;
use crate::extract::sanitize::{sanitize_text, strip_markup};
use crate::extract::{ExtractionStrategy, RawEntry};
use crate::utils::error::ExtractError;
use crate::utils::floor_char_boundary;

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]?[0-9]|2[0-3])[:.][0-5][0-9]\b").unwrap());

/// Leading separators between a time and its title
const TITLE_SEPARATORS: &[char] = &['-', '–', '—', ':', '|', '•', '.'];

/// Generic time/title scan strategy
pub struct HeuristicStrategy {
    /// Bytes of raw markup kept after the channel anchor
    window_bytes: usize,

    /// Bytes of raw markup kept before the channel anchor
    lead_bytes: usize,

    /// Maximum title length in characters
    max_title_chars: usize,
}

impl Default for HeuristicStrategy {
    fn default() -> Self {
        Self {
            window_bytes: 24_000,
            lead_bytes: 256,
            max_title_chars: 200,
        }
    }
}

impl HeuristicStrategy {
    /// Byte range of the scan window around the channel's identifying text
    ///
    /// Falls back to the document's leading window when neither the display
    /// name nor the id occurs in the document.
    fn scan_window(&self, raw: &str, channel: &ChannelDescriptor) -> (usize, usize) {
        let anchor = find_anchor(raw, &channel.display_name)
            .or_else(|| find_anchor(raw, &channel.id))
            .unwrap_or(0);

        let start = floor_char_boundary(raw, anchor.saturating_sub(self.lead_bytes));
        let end = floor_char_boundary(raw, anchor.saturating_add(self.window_bytes));
        (start, end)
    }
}

/// Case-insensitive position of `needle` in `haystack`
fn find_anchor(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }

    let re = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()?;

    re.find(haystack).map(|m| m.start())
}

impl ExtractionStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn extract(
        &self,
        raw: &str,
        channel: &ChannelDescriptor,
    ) -> Result<Vec<RawEntry>, ExtractError> {
        let (start, end) = self.scan_window(raw, channel);
        let text = strip_markup(&raw[start..end]);

        let matches: Vec<_> = TIME_RE.find_iter(&text).collect();
        let mut entries = Vec::new();

        for (i, m) in matches.iter().enumerate() {
            let tail_end = matches
                .get(i + 1)
                .map(|next| next.start())
                .unwrap_or(text.len());
            let tail = &text[m.end()..tail_end];

            // A listing is line-oriented; a title never crosses a line break
            let line = match tail.find('\n') {
                Some(pos) => &tail[..pos],
                None => tail,
            };

            let title = sanitize_text(
                line.trim_start_matches(|c: char| TITLE_SEPARATORS.contains(&c) || c.is_whitespace()),
            );
            if title.is_empty() {
                continue;
            }

            let title: String = title.chars().take(self.max_title_chars).collect();
            entries.push(RawEntry::new(m.as_str(), title));
        }

        Ok(entries)
    }
}
