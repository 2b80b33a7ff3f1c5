//! Cross-source dedup and merge engine
//!
//! Combines normalized entries contributed by possibly several sources for
//! the same channel into one ordered, non-overlapping, window-filtered
//! sequence. Sources are processed in configuration order; the
//! earlier-configured source wins ties on exact `(start, title)` duplicates.
//!
//! The merge phase is single-threaded and deterministic given its inputs:
//! it runs only after every source worker has completed or failed.

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::channels::ChannelDescriptor;

/// One schedule entry with canonical instants
///
/// Invariant: `start < stop`, always.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEntry {
    pub channel_id: String,
    pub start: DateTime<FixedOffset>,
    pub stop: DateTime<FixedOffset>,
    pub title: String,
    pub description: String,
}

/// Per-source processing state
///
/// `Pending → Fetched → Decoded → Parsed → { Extracted | ExtractionEmpty |
/// Failed }`. A transition to `Failed` stops processing for that source
/// only; the run continues with the remaining sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    Pending,
    Fetched,
    Decoded,
    Parsed,
    Extracted,
    ExtractionEmpty,
    Failed,
}

impl SourceStatus {
    /// Whether the source completed without failing
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Extracted | Self::ExtractionEmpty)
    }
}

/// Outcome of processing one distinct source locator
#[derive(Debug, Clone)]
pub struct SourceResult {
    /// The source locator this result covers
    pub locator: String,

    /// Final processing state
    pub status: SourceStatus,

    /// Normalized entries across all channels served by this source
    pub entries: Vec<NormalizedEntry>,

    /// Channel elements seen in the source (structured feeds only)
    pub channels_in_source: usize,

    /// Failure context when status is `Failed`
    pub error: Option<String>,
}

impl SourceResult {
    /// A fresh result in the `Pending` state
    #[must_use]
    pub fn pending(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            status: SourceStatus::Pending,
            entries: Vec::new(),
            channels_in_source: 0,
            error: None,
        }
    }

    /// Mark the source failed with context
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = SourceStatus::Failed;
        self.error = Some(error.into());
    }
}

/// The merged per-channel schedule
#[derive(Debug, Clone, Default)]
pub struct MergedSchedule {
    programmes: HashMap<String, Vec<NormalizedEntry>>,
}

impl MergedSchedule {
    /// Entries for a channel, ordered by start; empty for channels that
    /// survived with no programmes
    #[must_use]
    pub fn channel_entries(&self, channel_id: &str) -> &[NormalizedEntry] {
        self.programmes
            .get(channel_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total programme count across channels
    #[must_use]
    pub fn total(&self) -> usize {
        self.programmes.values().map(Vec::len).sum()
    }
}

/// Per-channel and per-source diagnostics from a merge
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// Programmes surviving per channel, registry order
    pub per_channel: Vec<(String, usize)>,

    /// Programmes surviving per source locator
    pub per_source: HashMap<String, usize>,
}

/// Dedup & merge engine
///
/// Holds the active window; both bounds come from configuration plus the
/// injected reference clock, never from ambient process state.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    window_start: DateTime<FixedOffset>,
    window_length: Duration,
}

impl MergeEngine {
    /// Engine for the half-open window `[window_start, window_start + len)`
    #[must_use]
    pub fn new(window_start: DateTime<FixedOffset>, window_length: Duration) -> Self {
        Self {
            window_start,
            window_length,
        }
    }

    /// Whether an entry's start falls inside the window
    ///
    /// An entry whose start lies outside is dropped even if its stop
    /// extends into the window.
    #[must_use]
    pub fn in_window(&self, start: DateTime<FixedOffset>) -> bool {
        start >= self.window_start && start < self.window_start + self.window_length
    }

    /// Merge per-source results into the final per-channel schedule
    ///
    /// `sources` must be in configuration order; earlier sources win exact
    /// `(start, title)` duplicates. Channels with zero surviving entries
    /// stay in the report (and the output channel list) with a zero count.
    pub fn merge(
        &self,
        channels: &[ChannelDescriptor],
        sources: &[SourceResult],
    ) -> (MergedSchedule, MergeReport) {
        let mut schedule = MergedSchedule::default();
        let mut report = MergeReport::default();

        for ch in channels {
            let mut accepted: Vec<NormalizedEntry> = Vec::new();
            let mut seen: HashSet<(i64, String)> = HashSet::new();

            for source in sources {
                let mut from_source = 0usize;

                for entry in source.entries.iter().filter(|e| e.channel_id == ch.id) {
                    let key = (entry.start.timestamp(), entry.title.clone());
                    if !seen.insert(key) {
                        debug!(
                            channel = %ch.id,
                            source = %source.locator,
                            title = %entry.title,
                            "Dropping exact duplicate from lower-priority source"
                        );
                        continue;
                    }
                    accepted.push(entry.clone());
                    from_source += 1;
                }

                if from_source > 0 {
                    *report.per_source.entry(source.locator.clone()).or_insert(0) += from_source;
                }
            }

            accepted.sort_by_key(|e| e.start);
            drop_same_start(&mut accepted);
            clamp_overlaps(&mut accepted);
            accepted.retain(|e| self.in_window(e.start));

            info!(
                channel = %ch.id,
                matched = accepted.len(),
                "Merged channel schedule"
            );

            report.per_channel.push((ch.id.clone(), accepted.len()));
            schedule.programmes.insert(ch.id.clone(), accepted);
        }

        (schedule, report)
    }
}

/// Resolve same-start collisions left over after exact dedup
///
/// Two sources can disagree on what airs in a slot (different titles, same
/// start). The stable sort keeps source-priority order among equal starts,
/// so retaining the first occurrence keeps the earlier-configured source's
/// entry and the output stays strictly ascending.
fn drop_same_start(entries: &mut Vec<NormalizedEntry>) {
    entries.dedup_by(|a, b| a.start == b.start);
}

/// Clamp stops so consecutive entries never overlap
///
/// Expects entries sorted by strictly ascending start. When an entry runs
/// past its successor's start, its stop is pulled back to that start;
/// `start < stop` is preserved because starts are strictly ascending.
fn clamp_overlaps(entries: &mut [NormalizedEntry]) {
    for i in 0..entries.len().saturating_sub(1) {
        let next_start = entries[i + 1].start;
        if entries[i].stop > next_start {
            entries[i].stop = next_start;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn vn() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn at(day: u32, hour: u32, min: u32) -> DateTime<FixedOffset> {
        vn().with_ymd_and_hms(2025, 10, day, hour, min, 0).unwrap()
    }

    fn entry(channel: &str, start: DateTime<FixedOffset>, minutes: i64, title: &str) -> NormalizedEntry {
        NormalizedEntry {
            channel_id: channel.to_string(),
            start,
            stop: start + Duration::minutes(minutes),
            title: title.to_string(),
            description: String::new(),
        }
    }

    fn descriptor(id: &str) -> ChannelDescriptor {
        ChannelDescriptor {
            id: id.to_string(),
            source_locator: "https://a.example".to_string(),
            display_name: id.to_uppercase(),
        }
    }

    fn result(locator: &str, entries: Vec<NormalizedEntry>) -> SourceResult {
        SourceResult {
            locator: locator.to_string(),
            status: SourceStatus::Extracted,
            entries,
            channels_in_source: 0,
            error: None,
        }
    }

    fn engine() -> MergeEngine {
        MergeEngine::new(at(8, 5, 0), Duration::days(2))
    }

    #[test]
    fn test_cross_source_duplicate_dropped() {
        let channels = vec![descriptor("vtv1")];
        let sources = vec![
            result("https://a.example", vec![entry("vtv1", at(8, 8, 0), 30, "News")]),
            result(
                "https://b.example",
                vec![
                    entry("vtv1", at(8, 8, 0), 30, "News"),
                    entry("vtv1", at(8, 8, 30), 30, "Weather"),
                ],
            ),
        ];

        let (schedule, report) = engine().merge(&channels, &sources);
        let merged = schedule.channel_entries("vtv1");

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "News");
        assert_eq!(merged[1].title, "Weather");
        assert_eq!(report.per_source["https://a.example"], 1);
        assert_eq!(report.per_source["https://b.example"], 1);
    }

    #[test]
    fn test_sorted_ascending_without_overlap() {
        let channels = vec![descriptor("vtv1")];
        let sources = vec![result(
            "https://a.example",
            vec![
                entry("vtv1", at(8, 9, 0), 120, "Long film"),
                entry("vtv1", at(8, 10, 0), 30, "Interruption"),
            ],
        )];

        let (schedule, _) = engine().merge(&channels, &sources);
        let merged = schedule.channel_entries("vtv1");

        assert_eq!(merged.len(), 2);
        for pair in merged.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert!(pair[0].stop <= pair[1].start, "entries must not overlap");
        }
        for e in merged {
            assert!(e.start < e.stop);
        }
    }

    #[test]
    fn test_window_filtering() {
        let channels = vec![descriptor("vtv1")];
        let sources = vec![result(
            "https://a.example",
            vec![
                entry("vtv1", at(8, 4, 0), 30, "Before window"),
                entry("vtv1", at(8, 6, 0), 30, "Inside"),
                entry("vtv1", at(10, 5, 0), 30, "At window end"),
                entry("vtv1", at(10, 6, 0), 30, "Past window"),
            ],
        )];

        let (schedule, _) = engine().merge(&channels, &sources);
        let merged = schedule.channel_entries("vtv1");

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "Inside");
    }

    #[test]
    fn test_entry_straddling_window_start_excluded() {
        // Starts before the window but stops inside: still excluded
        let channels = vec![descriptor("vtv1")];
        let sources = vec![result(
            "https://a.example",
            vec![entry("vtv1", at(8, 4, 45), 60, "Straddler")],
        )];

        let (schedule, _) = engine().merge(&channels, &sources);
        assert!(schedule.channel_entries("vtv1").is_empty());
    }

    #[test]
    fn test_channel_with_no_entries_retained() {
        let channels = vec![descriptor("vtv1"), descriptor("empty")];
        let sources = vec![result(
            "https://a.example",
            vec![entry("vtv1", at(8, 6, 0), 30, "Only programme")],
        )];

        let (schedule, report) = engine().merge(&channels, &sources);

        assert_eq!(schedule.channel_entries("empty").len(), 0);
        assert_eq!(report.per_channel.len(), 2);
        assert_eq!(report.per_channel[1], ("empty".to_string(), 0));
    }

    #[test]
    fn test_same_slot_conflict_resolved_by_priority() {
        // Same start, different titles: the earlier-configured source wins,
        // keeping the output strictly ascending
        let channels = vec![descriptor("vtv1")];
        let sources = vec![
            result("https://a.example", vec![entry("vtv1", at(8, 8, 0), 30, "News")]),
            result("https://b.example", vec![entry("vtv1", at(8, 8, 0), 30, "Tin tức")]),
        ];

        let (schedule, _) = engine().merge(&channels, &sources);
        let merged = schedule.channel_entries("vtv1");
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "News");
    }

    #[test]
    fn test_merge_is_deterministic() {
        let channels = vec![descriptor("vtv1")];
        let sources = vec![result(
            "https://a.example",
            vec![
                entry("vtv1", at(8, 9, 0), 30, "A"),
                entry("vtv1", at(8, 6, 0), 30, "B"),
                entry("vtv1", at(8, 7, 30), 30, "C"),
            ],
        )];

        let (first, _) = engine().merge(&channels, &sources);
        let (second, _) = engine().merge(&channels, &sources);
        assert_eq!(first.channel_entries("vtv1"), second.channel_entries("vtv1"));
    }

    #[test]
    fn test_status_is_ok() {
        assert!(SourceStatus::Extracted.is_ok());
        assert!(SourceStatus::ExtractionEmpty.is_ok());
        assert!(!SourceStatus::Failed.is_ok());
        assert!(!SourceStatus::Pending.is_ok());
    }
}
