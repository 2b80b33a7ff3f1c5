//! Per-run orchestration
//!
//! Drives one aggregation run: load the channel registry, fetch each
//! distinct source once under a bounded worker pool, extract and normalize
//! per channel, then merge single-threaded behind the completion barrier
//! and write the output document.
//!
//! ```text
//! registry ──▶ per-source workers (fetch → extract → normalize)
//!                      │ join_all barrier
//!                      ▼
//!              merge (single-threaded) ──▶ XMLTV writer
//! ```
//!
//! Per-source failures are absorbed here; only an unusable channel registry
//! or a run where every source failed surfaces as an error.

use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::channels::{self, ChannelDescriptor, ChannelMeta};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::{feed, StrategyChain};
use crate::fetch::SourceFetcher;
use crate::merge::{MergeEngine, SourceResult, SourceStatus};
use crate::output::XmltvWriter;
use crate::timenorm::TimeNormalizer;

// ============================================================================
// Run statistics
// ============================================================================

/// Run statistics (thread-safe)
#[derive(Debug, Default)]
pub struct RunStats {
    /// Distinct sources attempted
    pub sources_total: AtomicU64,

    /// Sources that completed (possibly empty)
    pub sources_ok: AtomicU64,

    /// Sources that failed
    pub sources_failed: AtomicU64,

    /// Raw entries produced by extraction
    pub raw_entries: AtomicU64,

    /// Entries dropped by time normalization
    pub entries_dropped: AtomicU64,

    /// Programmes surviving the merge
    pub programmes_written: AtomicU64,
}

impl RunStats {
    /// Create new stats counter
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_source_ok(&self) {
        self.sources_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_failure(&self) {
        self.sources_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_extraction(&self, raw: u64, normalized: u64) {
        self.raw_entries.fetch_add(raw, Ordering::Relaxed);
        self.entries_dropped
            .fetch_add(raw.saturating_sub(normalized), Ordering::Relaxed);
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sources_total: self.sources_total.load(Ordering::Relaxed),
            sources_ok: self.sources_ok.load(Ordering::Relaxed),
            sources_failed: self.sources_failed.load(Ordering::Relaxed),
            raw_entries: self.raw_entries.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
            programmes_written: self.programmes_written.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of run statistics
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub sources_total: u64,
    pub sources_ok: u64,
    pub sources_failed: u64,
    pub raw_entries: u64,
    pub entries_dropped: u64,
    pub programmes_written: u64,
}

// ============================================================================
// Run summary
// ============================================================================

/// What one run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Path of the written document
    pub output_path: PathBuf,

    /// Channels in the output (every registry channel survives)
    pub channels: usize,

    /// Programmes in the output
    pub programmes: usize,

    /// Sources that completed
    pub sources_ok: usize,

    /// Sources that failed
    pub sources_failed: usize,
}

// ============================================================================
// Aggregator
// ============================================================================

/// One-shot schedule aggregator
pub struct Aggregator {
    config: Config,
    fetcher: Arc<SourceFetcher>,
    chain: Arc<StrategyChain>,
    stats: Arc<RunStats>,
}

impl Aggregator {
    /// Create an aggregator from validated configuration
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid settings and a fetch error when
    /// the HTTP client cannot be constructed.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().map_err(|e| Error::config(e.to_string()))?;

        let fetcher = Arc::new(SourceFetcher::new(&config.fetch)?);

        Ok(Self {
            config,
            fetcher,
            chain: Arc::new(StrategyChain::standard()),
            stats: RunStats::new(),
        })
    }

    /// Statistics for the current/last run
    #[must_use]
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Run against the wall clock
    pub async fn run(&self) -> Result<RunSummary> {
        let now = Utc::now().with_timezone(&self.config.timezone());
        self.run_at(now).await
    }

    /// Run against an injected reference clock
    ///
    /// The reference fixes the window start and the date assumed for
    /// time-only listings, making a run reproducible for tests.
    pub async fn run_at(&self, reference: DateTime<FixedOffset>) -> Result<RunSummary> {
        let registry = channels::load(&self.config.schedule.channels_path)?;
        let sources = channels::distinct_sources(&registry);

        let window_end = reference + self.config.window();
        info!(
            channels = registry.len(),
            sources = sources.len(),
            window_start = %reference.format("%Y-%m-%d %H:%M:%S %z"),
            window_end = %window_end.format("%Y-%m-%d %H:%M:%S %z"),
            "Starting aggregation run"
        );

        self.stats
            .sources_total
            .store(sources.len() as u64, Ordering::Relaxed);

        let normalizer = TimeNormalizer::new(self.config.timezone(), reference);
        let permits = self
            .config
            .fetch
            .max_concurrent_sources
            .min(sources.len().max(1));
        let semaphore = Arc::new(Semaphore::new(permits));

        // One worker per distinct source; join_all doubles as the barrier
        // the merge phase requires and preserves configuration order.
        let futures = sources.iter().map(|locator| {
            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let chain = Arc::clone(&self.chain);
            let stats = Arc::clone(&self.stats);
            let normalizer = normalizer.clone();
            let served: Vec<ChannelDescriptor> = channels::channels_for_source(&registry, locator)
                .into_iter()
                .cloned()
                .collect();
            let locator = locator.clone();

            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let mut result = SourceResult::pending(&locator);
                        result.fail("worker pool closed");
                        stats.record_source_failure();
                        return (result, Vec::new());
                    }
                };

                process_source(&fetcher, &chain, &normalizer, &stats, locator, &served).await
            }
        });

        let outcomes = futures::future::join_all(futures).await;

        let (results, metas): (Vec<SourceResult>, Vec<Vec<ChannelMeta>>) =
            outcomes.into_iter().unzip();

        let channel_metas = resolve_channel_metas(&registry, metas);

        let engine = MergeEngine::new(reference, self.config.window());
        let (schedule, report) = engine.merge(&registry, &results);

        let sources_failed = results
            .iter()
            .filter(|r| r.status == SourceStatus::Failed)
            .count();
        let sources_ok = results.len() - sources_failed;

        if sources_failed == results.len() && schedule.total() == 0 {
            return Err(Error::NoOutput(format!(
                "all {} sources failed, nothing to write",
                results.len()
            )));
        }

        self.stats
            .programmes_written
            .store(schedule.total() as u64, Ordering::Relaxed);

        let writer = XmltvWriter::new(
            self.config.output.language.clone(),
            self.config.output.placeholder_title.clone(),
        );
        let output_path = writer.write(&self.config.output.path, &channel_metas, &schedule)?;

        for (channel_id, matched) in &report.per_channel {
            info!(channel = %channel_id, matched, "Channel summary");
        }
        for result in &results {
            match result.status {
                SourceStatus::Failed => warn!(
                    source = %result.locator,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Source summary: failed"
                ),
                _ => info!(
                    source = %result.locator,
                    status = ?result.status,
                    matched = report.per_source.get(&result.locator).copied().unwrap_or(0),
                    channels_in_source = result.channels_in_source,
                    "Source summary"
                ),
            }
        }
        info!(
            path = %output_path.display(),
            programmes = schedule.total(),
            channels = registry.len(),
            "Wrote schedule document"
        );

        Ok(RunSummary {
            output_path,
            channels: registry.len(),
            programmes: schedule.total(),
            sources_ok,
            sources_failed,
        })
    }
}

/// Fetch, extract and normalize one distinct source
///
/// Absorbs every failure into the returned [`SourceResult`]; never
/// propagates an error to the caller.
async fn process_source(
    fetcher: &SourceFetcher,
    chain: &StrategyChain,
    normalizer: &TimeNormalizer,
    stats: &RunStats,
    locator: String,
    served: &[ChannelDescriptor],
) -> (SourceResult, Vec<ChannelMeta>) {
    let mut result = SourceResult::pending(&locator);
    info!(source = %locator, channels = served.len(), "Downloading source");

    let bytes = match fetcher.fetch_bytes(&locator).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(source = %locator, error = %e, "Source fetch failed");
            result.fail(format!("fetch: {e}"));
            stats.record_source_failure();
            return (result, Vec::new());
        }
    };
    result.status = SourceStatus::Fetched;

    let text = match fetcher.decode_payload(&bytes, &locator) {
        Ok(text) => text,
        Err(e) => {
            warn!(source = %locator, error = %e, "Source decode failed");
            result.fail(format!("decode: {e}"));
            stats.record_source_failure();
            return (result, Vec::new());
        }
    };
    result.status = SourceStatus::Decoded;

    let metas = feed::channel_meta(&text);
    result.channels_in_source = metas.len();
    result.status = SourceStatus::Parsed;

    for channel in served {
        let raw = chain.extract(&text, channel);
        let normalized = normalizer.normalize_sequence(&channel.id, &locator, &raw);
        stats.record_extraction(raw.len() as u64, normalized.len() as u64);

        info!(
            source = %locator,
            channel = %channel.id,
            raw = raw.len(),
            normalized = normalized.len(),
            "Extracted channel entries"
        );

        result.entries.extend(normalized);
    }

    result.status = if result.entries.is_empty() {
        SourceStatus::ExtractionEmpty
    } else {
        SourceStatus::Extracted
    };
    stats.record_source_ok();

    (result, metas)
}

/// Resolve output channel metadata
///
/// Registry order and registry display names are authoritative; icons come
/// from the first structured source that carried one for the channel id
/// (case-insensitive).
fn resolve_channel_metas(
    registry: &[ChannelDescriptor],
    harvested: Vec<Vec<ChannelMeta>>,
) -> Vec<ChannelMeta> {
    let mut by_id: HashMap<String, ChannelMeta> = HashMap::new();

    for meta in harvested.into_iter().flatten() {
        by_id.entry(meta.id.to_lowercase()).or_insert(meta);
    }

    registry
        .iter()
        .map(|ch| {
            let source_meta = by_id.get(&ch.id.to_lowercase());
            let display_name = if ch.display_name.is_empty() {
                source_meta
                    .map(|m| m.display_name.clone())
                    .unwrap_or_else(|| ch.id.clone())
            } else {
                ch.display_name.clone()
            };

            ChannelMeta {
                id: ch.id.clone(),
                display_name,
                icon: source_meta.and_then(|m| m.icon.clone()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot() {
        let stats = RunStats::new();
        stats.record_source_ok();
        stats.record_source_failure();
        stats.record_extraction(10, 8);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.sources_ok, 1);
        assert_eq!(snapshot.sources_failed, 1);
        assert_eq!(snapshot.raw_entries, 10);
        assert_eq!(snapshot.entries_dropped, 2);
    }

    #[test]
    fn test_resolve_channel_metas_prefers_registry_name() {
        let registry = vec![ChannelDescriptor {
            id: "vtv1".to_string(),
            source_locator: "https://a.example".to_string(),
            display_name: "VTV1 HD".to_string(),
        }];

        let harvested = vec![vec![ChannelMeta {
            id: "VTV1".to_string(),
            display_name: "VTV1 upstream".to_string(),
            icon: Some("https://img.example/vtv1.png".to_string()),
        }]];

        let metas = resolve_channel_metas(&registry, harvested);
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].display_name, "VTV1 HD");
        assert_eq!(metas[0].icon.as_deref(), Some("https://img.example/vtv1.png"));
    }

    #[test]
    fn test_resolve_channel_metas_first_source_wins() {
        let registry = vec![ChannelDescriptor {
            id: "vtv1".to_string(),
            source_locator: "https://a.example".to_string(),
            display_name: "VTV1".to_string(),
        }];

        let harvested = vec![
            vec![ChannelMeta {
                id: "vtv1".to_string(),
                display_name: "first".to_string(),
                icon: Some("first.png".to_string()),
            }],
            vec![ChannelMeta {
                id: "vtv1".to_string(),
                display_name: "second".to_string(),
                icon: Some("second.png".to_string()),
            }],
        ];

        let metas = resolve_channel_metas(&registry, harvested);
        assert_eq!(metas[0].icon.as_deref(), Some("first.png"));
    }

    #[test]
    fn test_aggregator_rejects_invalid_config() {
        let mut config = Config::default();
        config.fetch.max_concurrent_sources = 0;
        assert!(Aggregator::new(config).is_err());
    }
}
