//! Channel registry file parsing
//!
//! The registry is a UTF-8 text file with one channel per line:
//!
//! ```text
//! # id | source locator | display name
//! vtv1 | https://example.com/epg.xml.gz | VTV1 HD
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Lines with fewer than
//! three pipe-delimited fields are skipped with a warning. A missing file or
//! a registry with zero usable channels is fatal for the run.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::error::{Error, Result};

/// One configured channel: identity, where to find it, how to label it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// Channel identity key, matched case-insensitively against sources
    pub id: String,

    /// Locator of the source supplying this channel's schedule
    pub source_locator: String,

    /// Human-readable display name
    pub display_name: String,
}

/// Display metadata for a channel in the output document
///
/// The registry display name is authoritative; the icon is harvested from a
/// structured source feed when one carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub id: String,
    pub display_name: String,
    pub icon: Option<String>,
}

/// Load the channel registry from a file
///
/// # Errors
///
/// Returns [`Error::NoChannels`] if the file is missing, unreadable, or
/// contains zero usable channel lines.
pub fn load(path: &Path) -> Result<Vec<ChannelDescriptor>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::NoChannels(format!("{}: {e}", path.display())))?;

    let channels = parse(&content);

    if channels.is_empty() {
        return Err(Error::NoChannels(format!(
            "{}: no usable channel lines",
            path.display()
        )));
    }

    Ok(channels)
}

/// Parse registry content, preserving line order
pub fn parse(content: &str) -> Vec<ChannelDescriptor> {
    let mut channels = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() < 3 {
            warn!(
                line = lineno + 1,
                content = line,
                "Skipping malformed channel line (expected 'id | locator | name')"
            );
            continue;
        }

        channels.push(ChannelDescriptor {
            id: parts[0].to_string(),
            source_locator: parts[1].to_string(),
            display_name: parts[2].to_string(),
        });
    }

    channels
}

/// Distinct source locators in first-configured order
///
/// Several channels often share one source; the fetch phase downloads each
/// distinct locator exactly once. The returned order is the configuration
/// order, which the merge engine uses as source priority.
pub fn distinct_sources(channels: &[ChannelDescriptor]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();

    for ch in channels {
        if seen.insert(ch.source_locator.as_str()) {
            sources.push(ch.source_locator.clone());
        }
    }

    sources
}

/// Channels served by the given source locator, in registry order
pub fn channels_for_source<'a>(
    channels: &'a [ChannelDescriptor],
    locator: &str,
) -> Vec<&'a ChannelDescriptor> {
    channels
        .iter()
        .filter(|ch| ch.source_locator == locator)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let content = "\
# comment line
vtv1 | https://a.example/epg.xml | VTV1 HD

vtv2 | https://a.example/epg.xml | VTV2
htv7 | https://b.example/lich.html | HTV7
";
        let channels = parse(content);
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].id, "vtv1");
        assert_eq!(channels[0].source_locator, "https://a.example/epg.xml");
        assert_eq!(channels[0].display_name, "VTV1 HD");
    }

    #[test]
    fn test_parse_skips_malformed() {
        let content = "vtv1 | only-two-fields\nvtv2 | https://a.example | VTV2\n";
        let channels = parse(content);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].id, "vtv2");
    }

    #[test]
    fn test_parse_extra_fields_tolerated() {
        let content = "vtv1 | https://a.example | VTV1 | trailing | junk\n";
        let channels = parse(content);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].display_name, "VTV1");
    }

    #[test]
    fn test_distinct_sources_preserve_order() {
        let channels = parse(
            "a | https://one.example | A\n\
             b | https://two.example | B\n\
             c | https://one.example | C\n",
        );
        let sources = distinct_sources(&channels);
        assert_eq!(sources, vec!["https://one.example", "https://two.example"]);
    }

    #[test]
    fn test_channels_for_source() {
        let channels = parse(
            "a | https://one.example | A\n\
             b | https://two.example | B\n\
             c | https://one.example | C\n",
        );
        let for_one = channels_for_source(&channels, "https://one.example");
        assert_eq!(for_one.len(), 2);
        assert_eq!(for_one[1].id, "c");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Path::new("/nonexistent/channels.txt")).unwrap_err();
        assert!(matches!(err, Error::NoChannels(_)));
    }
}
