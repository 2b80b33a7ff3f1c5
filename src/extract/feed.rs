//! Structured feed (XMLTV) extraction
//!
//! Highest-priority strategy: if the raw content carries XMLTV structure
//! (`programme`/`channel` elements), entries are extracted keyed by the
//! embedded channel attribute, matched case-insensitively. The document is
//! parsed leniently, so feeds with minor markup defects still extract.
//!
//! This strategy also harvests per-source channel display metadata
//! (display-name, icon) for the document builder.

use lazy_static::lazy_static;
use scraper::{Html, Selector};

use crate::channels::{ChannelDescriptor, ChannelMeta};
use crate::extract::sanitize::sanitize_text;
use crate::extract::{ExtractionStrategy, RawEntry};
use crate::utils::error::ExtractError;

// Helper macro to parse selectors safely at startup
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    static ref PROGRAMME: Selector = parse_selector!("programme");
    static ref CHANNEL: Selector = parse_selector!("channel");
    static ref TITLE: Selector = parse_selector!("title");
    static ref DESC: Selector = parse_selector!("desc");
    static ref DISPLAY_NAME: Selector = parse_selector!("display-name");
    static ref ICON: Selector = parse_selector!("icon");
}

/// XMLTV structured feed strategy
pub struct FeedStrategy;

impl ExtractionStrategy for FeedStrategy {
    fn name(&self) -> &'static str {
        "structured-feed"
    }

    fn extract(
        &self,
        raw: &str,
        channel: &ChannelDescriptor,
    ) -> Result<Vec<RawEntry>, ExtractError> {
        let document = Html::parse_document(raw);

        if document.select(&PROGRAMME).next().is_none()
            && document.select(&CHANNEL).next().is_none()
        {
            return Err(ExtractError::NotStructured);
        }

        let wanted = channel.id.to_lowercase();
        let mut entries = Vec::new();

        for programme in document.select(&PROGRAMME) {
            let channel_attr = programme.value().attr("channel").unwrap_or("");
            if channel_attr.to_lowercase() != wanted {
                continue;
            }

            let Some(start) = programme.value().attr("start") else {
                continue;
            };
            let start = start.trim();
            if start.is_empty() {
                continue;
            }

            let stop = programme
                .value()
                .attr("stop")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from);

            let title = programme
                .select(&TITLE)
                .next()
                .map(|el| sanitize_text(&el.text().collect::<String>()))
                .unwrap_or_default();

            let description = programme
                .select(&DESC)
                .next()
                .map(|el| sanitize_text(&el.text().collect::<String>()))
                .filter(|s| !s.is_empty());

            entries.push(RawEntry {
                time_text: start.to_string(),
                title,
                end_text: stop,
                description,
            });
        }

        Ok(entries)
    }
}

/// Harvest channel display metadata carried by a structured feed
///
/// Returns one [`ChannelMeta`] per channel element with an id; callers keep
/// the first occurrence per id across sources. Non-structured content
/// yields an empty list.
pub fn channel_meta(raw: &str) -> Vec<ChannelMeta> {
    let document = Html::parse_document(raw);
    let mut metas = Vec::new();

    for ch in document.select(&CHANNEL) {
        let Some(id) = ch.value().attr("id").map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };

        let display_name = ch
            .select(&DISPLAY_NAME)
            .next()
            .map(|el| sanitize_text(&el.text().collect::<String>()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| id.to_string());

        let icon = ch
            .select(&ICON)
            .next()
            .and_then(|el| el.value().attr("src"))
            .map(String::from);

        metas.push(ChannelMeta {
            id: id.to_string(),
            display_name,
            icon,
        });
    }

    metas
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="upstream">
  <channel id="VTV1">
    <display-name>VTV1 HD</display-name>
    <icon src="https://img.example/vtv1.png"/>
  </channel>
  <channel id="vtv2">
    <display-name>VTV2</display-name>
  </channel>
  <programme start="20251008060000 +0700" stop="20251008063000 +0700" channel="VTV1">
    <title lang="vi">Chào buổi sáng</title>
    <desc lang="vi">Bản tin sáng</desc>
  </programme>
  <programme start="20251008063000 +0700" channel="vtv1">
    <title lang="vi">Thời sự</title>
  </programme>
  <programme start="20251008070000 +0700" channel="vtv2">
    <title lang="vi">Phim truyện</title>
  </programme>
</tv>
"#;

    fn channel(id: &str) -> ChannelDescriptor {
        ChannelDescriptor {
            id: id.to_string(),
            source_locator: "https://a.example/epg.xml".to_string(),
            display_name: id.to_uppercase(),
        }
    }

    #[test]
    fn test_extract_matches_case_insensitive() {
        let entries = FeedStrategy.extract(FEED, &channel("vtv1")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].time_text, "20251008060000 +0700");
        assert_eq!(entries[0].title, "Chào buổi sáng");
        assert_eq!(entries[0].end_text.as_deref(), Some("20251008063000 +0700"));
        assert_eq!(entries[0].description.as_deref(), Some("Bản tin sáng"));
        assert_eq!(entries[1].title, "Thời sự");
        assert!(entries[1].end_text.is_none());
    }

    #[test]
    fn test_extract_other_channel() {
        let entries = FeedStrategy.extract(FEED, &channel("VTV2")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Phim truyện");
    }

    #[test]
    fn test_extract_unknown_channel_is_empty() {
        let entries = FeedStrategy.extract(FEED, &channel("htv7")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_non_feed_content_rejected() {
        let html = "<html><body><h1>Lịch phát sóng</h1><p>08:00 News</p></body></html>";
        let result = FeedStrategy.extract(html, &channel("vtv1"));
        assert!(matches!(result, Err(ExtractError::NotStructured)));
    }

    #[test]
    fn test_channel_meta_harvest() {
        let metas = channel_meta(FEED);
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].id, "VTV1");
        assert_eq!(metas[0].display_name, "VTV1 HD");
        assert_eq!(metas[0].icon.as_deref(), Some("https://img.example/vtv1.png"));
        assert_eq!(metas[1].id, "vtv2");
        assert!(metas[1].icon.is_none());
    }

    #[test]
    fn test_channel_meta_on_plain_html_is_empty() {
        let metas = channel_meta("<html><body>nothing</body></html>");
        assert!(metas.is_empty());
    }
}
