//! lichtv - Multi-source TV schedule aggregator
//!
//! Aggregates broadcast programme schedules for a fixed set of channels from
//! heterogeneous sources (XMLTV feeds, schedule web pages) and merges them
//! into one canonical XMLTV document covering a bounded forward window.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`channels`] - Channel registry file parsing
//! - [`fetch`] - HTTP source fetching with rate limiting and decompression
//! - [`extract`] - Extraction strategy chain (feed, layout, heuristic)
//! - [`timenorm`] - Time normalization into timezone-aware instants
//! - [`merge`] - Cross-source dedup and merge engine
//! - [`output`] - XMLTV document writer
//! - [`pipeline`] - Per-run orchestration and statistics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use lichtv::config::Config;
//! use lichtv::pipeline::Aggregator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let aggregator = Aggregator::new(config)?;
//!     let summary = aggregator.run().await?;
//!     println!("wrote {} programmes", summary.programmes);
//!     Ok(())
//! }
//! ```

pub mod channels;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod timenorm;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::channels::{ChannelDescriptor, ChannelMeta};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::extract::{RawEntry, StrategyChain};
    pub use crate::merge::{MergedSchedule, NormalizedEntry, SourceResult, SourceStatus};
    pub use crate::pipeline::{Aggregator, RunSummary};
    pub use crate::timenorm::TimeNormalizer;
}

// Direct re-exports for convenience
pub use channels::ChannelDescriptor;
pub use merge::NormalizedEntry;
