//! Schedule extraction strategy chain
//!
//! Turns an opaque raw source document into raw schedule entries for one
//! channel. Strategies are tried in a fixed priority order:
//!
//! 1. [`feed::FeedStrategy`] - structured XMLTV feed parse
//! 2. [`layout::LayoutStrategy`] - named site-layout extractors selected by
//!    source-locator domain signature
//! 3. [`heuristic::HeuristicStrategy`] - generic time/title scan over a
//!    stripped text window around the channel's identifying text
//!
//! The first strategy yielding a non-empty result wins. All strategies
//! failing (error or empty) yields an empty list, not an error: absence of
//! data for a channel from a given source is a normal, non-fatal outcome.

pub mod feed;
pub mod heuristic;
pub mod layout;
pub mod sanitize;

use std::collections::HashSet;
use tracing::debug;

use crate::channels::ChannelDescriptor;
use crate::utils::error::ExtractError;

/// One schedule entry as a strategy found it, before time normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Start time text as found in the source
    pub time_text: String,

    /// Programme title; may be empty for structured feeds without one
    pub title: String,

    /// End time text, when the source carries one
    pub end_text: Option<String>,

    /// Programme description, when the source carries one
    pub description: Option<String>,
}

impl RawEntry {
    /// Entry with only a start time and title
    pub fn new(time_text: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            time_text: time_text.into(),
            title: title.into(),
            end_text: None,
            description: None,
        }
    }
}

/// One algorithm attempting to derive raw schedule entries from a specific
/// class of source document
pub trait ExtractionStrategy: Send + Sync {
    /// Short strategy name used in log events
    fn name(&self) -> &'static str;

    /// Extract raw entries for one channel from raw source content
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractError`] when the content does not fit this
    /// strategy; the chain treats that the same as an empty result and
    /// falls through to the next strategy.
    fn extract(
        &self,
        raw: &str,
        channel: &ChannelDescriptor,
    ) -> Result<Vec<RawEntry>, ExtractError>;
}

/// The ordered extraction strategy chain
pub struct StrategyChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl StrategyChain {
    /// The standard chain: structured feed, site layouts, generic heuristic
    #[must_use]
    pub fn standard() -> Self {
        Self {
            strategies: vec![
                Box::new(feed::FeedStrategy),
                Box::new(layout::LayoutStrategy::standard()),
                Box::new(heuristic::HeuristicStrategy::default()),
            ],
        }
    }

    /// Build a chain from explicit strategies, in priority order
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run the chain for one channel; first non-empty result wins
    ///
    /// Strategy errors are logged and absorbed; an exhausted chain returns
    /// an empty list.
    pub fn extract(&self, raw: &str, channel: &ChannelDescriptor) -> Vec<RawEntry> {
        for strategy in &self.strategies {
            match strategy.extract(raw, channel) {
                Ok(entries) if !entries.is_empty() => {
                    debug!(
                        strategy = strategy.name(),
                        channel = %channel.id,
                        entries = entries.len(),
                        "Extraction strategy matched"
                    );
                    return dedup_raw(entries);
                }
                Ok(_) => {
                    debug!(
                        strategy = strategy.name(),
                        channel = %channel.id,
                        "Extraction strategy found nothing"
                    );
                }
                Err(e) => {
                    debug!(
                        strategy = strategy.name(),
                        channel = %channel.id,
                        error = %e,
                        "Extraction strategy failed, falling back"
                    );
                }
            }
        }

        Vec::new()
    }
}

/// Collapse entries identical in `(time_text, title)`, preserving
/// first-seen order
pub fn dedup_raw(entries: Vec<RawEntry>) -> Vec<RawEntry> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert((e.time_text.clone(), e.title.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str) -> ChannelDescriptor {
        ChannelDescriptor {
            id: id.to_string(),
            source_locator: "https://a.example/epg.xml".to_string(),
            display_name: id.to_uppercase(),
        }
    }

    struct FailingStrategy;
    impl ExtractionStrategy for FailingStrategy {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn extract(
            &self,
            _raw: &str,
            _channel: &ChannelDescriptor,
        ) -> Result<Vec<RawEntry>, ExtractError> {
            Err(ExtractError::NotStructured)
        }
    }

    struct EmptyStrategy;
    impl ExtractionStrategy for EmptyStrategy {
        fn name(&self) -> &'static str {
            "empty"
        }
        fn extract(
            &self,
            _raw: &str,
            _channel: &ChannelDescriptor,
        ) -> Result<Vec<RawEntry>, ExtractError> {
            Ok(Vec::new())
        }
    }

    struct FixedStrategy(Vec<RawEntry>);
    impl ExtractionStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn extract(
            &self,
            _raw: &str,
            _channel: &ChannelDescriptor,
        ) -> Result<Vec<RawEntry>, ExtractError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_first_non_empty_wins() {
        let chain = StrategyChain::new(vec![
            Box::new(FailingStrategy),
            Box::new(EmptyStrategy),
            Box::new(FixedStrategy(vec![RawEntry::new("08:00", "News")])),
        ]);

        let entries = chain.extract("irrelevant", &channel("vtv1"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "News");
    }

    #[test]
    fn test_exhausted_chain_is_empty_not_error() {
        let chain = StrategyChain::new(vec![Box::new(FailingStrategy), Box::new(EmptyStrategy)]);
        let entries = chain.extract("irrelevant", &channel("vtv1"));
        assert!(entries.is_empty());
    }

    #[test]
    fn test_earlier_strategy_shadows_later() {
        let chain = StrategyChain::new(vec![
            Box::new(FixedStrategy(vec![RawEntry::new("08:00", "First")])),
            Box::new(FixedStrategy(vec![RawEntry::new("09:00", "Second")])),
        ]);

        let entries = chain.extract("irrelevant", &channel("vtv1"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "First");
    }

    #[test]
    fn test_dedup_raw_preserves_order() {
        let entries = vec![
            RawEntry::new("08:00", "News"),
            RawEntry::new("08:30", "Weather"),
            RawEntry::new("08:00", "News"),
            RawEntry::new("08:00", "Other"),
        ];

        let deduped = dedup_raw(entries);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0].title, "News");
        assert_eq!(deduped[1].title, "Weather");
        assert_eq!(deduped[2].title, "Other");
    }
}
