//! Time normalization
//!
//! Maps raw time text onto canonical timezone-aware instants. Sources emit
//! anything from full XMLTV stamps (`20251008060000 +0700`) to bare clock
//! readings (`23:30`); the normalizer resolves them against a configured
//! local zone and a reference clock, inferring missing end times and
//! resolving day-rollover ambiguity in ordered time-only listings.
//!
//! Rules, in order:
//! 1. Full absolute date-time: parsed directly; an explicit offset is kept,
//!    otherwise the configured local zone is assumed.
//! 2. Time-only `HH:MM` (colon or dot): combined with the reference date;
//!    if the previous entry's resolved start exists and the new instant is
//!    not after it, the date advances one day (midnight rollover).
//! 3. No pattern match: the entry is dropped with a warn event, never fatal.
//!
//! Stop derivation: explicit end text strictly after start wins; else the
//! next entry's resolved start (rolled forward one day if not after start);
//! else start plus 30 minutes.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use crate::extract::RawEntry;
use crate::merge::NormalizedEntry;

static XMLTV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{14})\s*([+-]\d{4})?$").unwrap());

static CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]?[0-9]|2[0-3])[:.]([0-5][0-9])$").unwrap());

/// Naive date-time formats seen across schedule sources
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M",
];

/// Default programme length when no end is derivable
const DEFAULT_PROGRAMME_MINUTES: i64 = 30;

/// Converts raw time text into canonical instants
///
/// One normalizer serves a whole run; the timezone and reference clock are
/// injected so behavior is reproducible under test.
#[derive(Debug, Clone)]
pub struct TimeNormalizer {
    tz: FixedOffset,
    reference: DateTime<FixedOffset>,
}

impl TimeNormalizer {
    /// Create a normalizer for a local zone and reference clock
    #[must_use]
    pub fn new(tz: FixedOffset, reference: DateTime<FixedOffset>) -> Self {
        Self {
            tz,
            reference: reference.with_timezone(&tz),
        }
    }

    /// The reference instant used for time-only resolution
    #[must_use]
    pub fn reference(&self) -> DateTime<FixedOffset> {
        self.reference
    }

    /// Normalize one source's ordered entry sequence for a channel
    ///
    /// Entries with unparseable start text are dropped and logged; the rest
    /// resolve in listing order so rollover and stop inference see their
    /// neighbors. Every returned entry satisfies `start < stop`.
    pub fn normalize_sequence(
        &self,
        channel_id: &str,
        source_locator: &str,
        entries: &[RawEntry],
    ) -> Vec<NormalizedEntry> {
        // Pass 1: resolve start instants in listing order
        let mut resolved: Vec<(usize, DateTime<FixedOffset>)> = Vec::new();
        let mut prev_start: Option<DateTime<FixedOffset>> = None;

        for (idx, raw) in entries.iter().enumerate() {
            match self.resolve_start(&raw.time_text, prev_start) {
                Some(start) => {
                    prev_start = Some(start);
                    resolved.push((idx, start));
                }
                None => {
                    warn!(
                        channel = channel_id,
                        source = source_locator,
                        time_text = %raw.time_text,
                        "Dropping entry with unparseable start time"
                    );
                }
            }
        }

        // Pass 2: derive stop instants now that the neighbors are known
        let mut out = Vec::with_capacity(resolved.len());

        for (pos, (idx, start)) in resolved.iter().enumerate() {
            let raw = &entries[*idx];
            let next_start = resolved.get(pos + 1).map(|(_, s)| *s);
            let stop = self.resolve_stop(*start, raw.end_text.as_deref(), next_start);

            out.push(NormalizedEntry {
                channel_id: channel_id.to_string(),
                start: *start,
                stop,
                title: raw.title.clone(),
                description: raw.description.clone().unwrap_or_default(),
            });
        }

        out
    }

    /// Resolve a start instant from time text
    ///
    /// `prev` is the previous entry's resolved start in the same sequence,
    /// used for midnight rollover of time-only listings.
    pub fn resolve_start(
        &self,
        time_text: &str,
        prev: Option<DateTime<FixedOffset>>,
    ) -> Option<DateTime<FixedOffset>> {
        let text = time_text.trim();

        if let Some(dt) = self.parse_absolute(text) {
            return Some(dt);
        }

        if let Some(time) = parse_clock(text) {
            let date = self.reference.date_naive();
            let mut candidate = self.at_local(date, time)?;

            if let Some(prev) = prev {
                if candidate <= prev {
                    candidate = self.at_local(date.succ_opt()?, time)?;
                }
            }

            return Some(candidate);
        }

        None
    }

    /// Parse a full absolute date-time representation
    ///
    /// Accepts XMLTV stamps with or without an explicit offset, RFC 3339,
    /// and common naive date-time spellings. Never matches bare clock text.
    pub fn parse_absolute(&self, text: &str) -> Option<DateTime<FixedOffset>> {
        if let Some(caps) = XMLTV_RE.captures(text) {
            let naive = NaiveDateTime::parse_from_str(&caps[1], "%Y%m%d%H%M%S").ok()?;

            let offset = match caps.get(2) {
                Some(m) => parse_offset(m.as_str())?,
                None => self.tz,
            };

            return offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&self.tz));
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&self.tz));
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return self
                    .tz
                    .from_local_datetime(&naive)
                    .single()
                    .map(|dt| dt.with_timezone(&self.tz));
            }
        }

        // Stamps with trailing decorations the strict pattern rejects,
        // e.g. '20251008060000+07:00'; the leading 14 digits are still a
        // usable local stamp
        if text.len() >= 14 && text.as_bytes()[..14].iter().all(u8::is_ascii_digit) {
            let naive = NaiveDateTime::parse_from_str(&text[..14], "%Y%m%d%H%M%S").ok()?;
            return self
                .tz
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&self.tz));
        }

        None
    }

    /// Derive a stop instant for an entry
    fn resolve_stop(
        &self,
        start: DateTime<FixedOffset>,
        end_text: Option<&str>,
        next_start: Option<DateTime<FixedOffset>>,
    ) -> DateTime<FixedOffset> {
        if let Some(end_text) = end_text {
            if let Some(stop) = self.resolve_end(end_text, start) {
                if stop > start {
                    return stop;
                }
            }
        }

        if let Some(next) = next_start {
            if next > start {
                return next;
            }
            let rolled = next + Duration::days(1);
            if rolled > start {
                return rolled;
            }
        }

        start + Duration::minutes(DEFAULT_PROGRAMME_MINUTES)
    }

    /// Resolve end text against the entry's start
    ///
    /// Clock-only end text takes the start's date, rolling one day forward
    /// when the programme crosses midnight.
    fn resolve_end(&self, end_text: &str, start: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let text = end_text.trim();

        if let Some(dt) = self.parse_absolute(text) {
            return Some(dt);
        }

        let time = parse_clock(text)?;
        let mut candidate = self.at_local(start.date_naive(), time)?;
        if candidate <= start {
            candidate = self.at_local(start.date_naive().succ_opt()?, time)?;
        }
        Some(candidate)
    }

    fn at_local(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<FixedOffset>> {
        self.tz.from_local_datetime(&date.and_time(time)).single()
    }
}

/// Parse bare `HH:MM` / `HH.MM` clock text
fn parse_clock(text: &str) -> Option<NaiveTime> {
    let caps = CLOCK_RE.captures(text.trim())?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Parse an XMLTV `±HHMM` offset
fn parse_offset(text: &str) -> Option<FixedOffset> {
    let sign = if text.starts_with('-') { -1 } else { 1 };
    let hours: i32 = text.get(1..3)?.parse().ok()?;
    let minutes: i32 = text.get(3..5)?.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
