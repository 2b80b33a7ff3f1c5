//! Site-layout extraction
//!
//! Second-priority strategy: a small registry of named layouts covering the
//! markup shapes schedule pages actually use. Each layout knows how to find
//! a schedule container associated with a channel name and pull paired
//! time/title fields from rows within.
//!
//! Layouts carry domain hints; for a known domain only its layouts run,
//! otherwise every layout is tried in registry order.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

use crate::channels::ChannelDescriptor;
use crate::extract::sanitize::sanitize_text;
use crate::extract::{ExtractionStrategy, RawEntry};
use crate::utils::error::ExtractError;
use crate::utils::extract_domain;

// Helper macro to parse selectors safely at startup
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    // Table-shaped schedule pages
    static ref TABLE_CONTAINERS: Vec<Selector> = vec![
        parse_selector!("table.schedule"),
        parse_selector!("table#schedule"),
        parse_selector!("table.lich-phat-song"),
        parse_selector!("div.schedule-table table"),
    ];
    static ref TABLE_ROW: Selector = parse_selector!("tr");
    static ref TABLE_TIME: Vec<Selector> = vec![
        parse_selector!("td.time"),
        parse_selector!("th.time"),
        parse_selector!("td:first-child"),
    ];
    static ref TABLE_TITLE: Vec<Selector> = vec![
        parse_selector!("td.title"),
        parse_selector!("td.name"),
        parse_selector!("td:nth-child(2)"),
    ];
    static ref TABLE_DESC: Vec<Selector> = vec![
        parse_selector!("td.desc"),
        parse_selector!("td.description"),
    ];

    // List-shaped schedule pages
    static ref LIST_CONTAINERS: Vec<Selector> = vec![
        parse_selector!("ul.schedule"),
        parse_selector!("ol.schedule"),
        parse_selector!("div.program-list"),
        parse_selector!("div.lich-phat-song"),
        parse_selector!("section.schedule"),
    ];
    static ref LIST_ROW: Selector = parse_selector!("li, div.row, div.item");
    static ref LIST_TIME: Vec<Selector> = vec![
        parse_selector!(".time"),
        parse_selector!(".gio"),
        parse_selector!("time"),
    ];
    static ref LIST_TITLE: Vec<Selector> = vec![
        parse_selector!(".title"),
        parse_selector!(".name"),
        parse_selector!(".programme"),
    ];
    static ref LIST_DESC: Vec<Selector> = vec![
        parse_selector!(".desc"),
        parse_selector!(".mota"),
    ];

    // Clock text inside a cell, e.g. "08:00" or "21.30"
    static ref CELL_TIME: Regex = Regex::new(r"\b([01]?[0-9]|2[0-3])[:.][0-5][0-9]\b").unwrap();
}

/// One named site layout
pub struct SiteLayout {
    name: &'static str,
    domain_hints: &'static [&'static str],
    containers: &'static [Selector],
    row: &'static Selector,
    time: &'static [Selector],
    title: &'static [Selector],
    desc: &'static [Selector],
}

impl SiteLayout {
    fn table() -> Self {
        Self {
            name: "schedule-table",
            domain_hints: &["vtv", "vtvgiaitri", "sctv"],
            containers: &TABLE_CONTAINERS,
            row: &TABLE_ROW,
            time: &TABLE_TIME,
            title: &TABLE_TITLE,
            desc: &TABLE_DESC,
        }
    }

    fn list() -> Self {
        Self {
            name: "programme-list",
            domain_hints: &["htv", "hplus", "thvl"],
            containers: &LIST_CONTAINERS,
            row: &LIST_ROW,
            time: &LIST_TIME,
            title: &LIST_TITLE,
            desc: &LIST_DESC,
        }
    }

    fn matches_domain(&self, domain: &str) -> bool {
        self.domain_hints.iter().any(|hint| domain.contains(hint))
    }

    fn extract(
        &self,
        document: &Html,
        channel: &ChannelDescriptor,
    ) -> Result<Vec<RawEntry>, ExtractError> {
        let containers = self.find_containers(document);
        if containers.is_empty() {
            return Err(ExtractError::NoContainer(channel.id.clone()));
        }

        // A container names its channel via attributes, a heading, or its
        // leading text. A lone container on the page is assumed to belong
        // to the requested channel.
        let target = containers
            .iter()
            .find(|c| container_matches_channel(c, channel))
            .or_else(|| (containers.len() == 1).then(|| &containers[0]))
            .ok_or_else(|| ExtractError::NoContainer(channel.id.clone()))?;

        let mut entries = Vec::new();

        for row in target.select(self.row) {
            let Some((time_text, end_text)) = self.row_times(&row) else {
                continue;
            };

            let Some(title) = self.row_text(&row, self.title) else {
                continue;
            };

            let description = self
                .first_text(&row, self.desc)
                .filter(|s| !s.is_empty());

            entries.push(RawEntry {
                time_text,
                title,
                end_text,
                description,
            });
        }

        if entries.is_empty() {
            return Err(ExtractError::NoRows);
        }

        Ok(entries)
    }

    /// Containers matching any container selector, document order, deduped
    fn find_containers<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for sel in self.containers {
            for el in document.select(sel) {
                if seen.insert(el.id()) {
                    out.push(el);
                }
            }
        }

        out
    }

    /// Start (and optional end) clock text from a row
    ///
    /// A cell reading "08:00 - 09:30" yields both; "08:00" yields only the
    /// start.
    fn row_times(&self, row: &ElementRef) -> Option<(String, Option<String>)> {
        for sel in self.time {
            if let Some(cell) = row.select(sel).next() {
                let text: String = cell.text().collect();
                let mut matches = CELL_TIME.find_iter(&text);
                if let Some(start) = matches.next() {
                    let end = matches.next().map(|m| m.as_str().to_string());
                    return Some((start.as_str().to_string(), end));
                }
            }
        }

        // Row without a recognizable time cell: scan the whole row text
        let text: String = row.text().collect();
        let mut matches = CELL_TIME.find_iter(&text);
        let start = matches.next()?;
        let end = matches.next().map(|m| m.as_str().to_string());
        Some((start.as_str().to_string(), end))
    }

    /// First non-empty sanitized text among `selectors` that is not just a
    /// clock reading leaking through a broad selector
    fn row_text(&self, row: &ElementRef, selectors: &[Selector]) -> Option<String> {
        for sel in selectors {
            for cell in row.select(sel) {
                let text = sanitize_text(&cell.text().collect::<String>());
                if text.is_empty() {
                    continue;
                }
                if CELL_TIME.is_match(&text) && CELL_TIME.replace_all(&text, "").trim().is_empty() {
                    continue;
                }
                return Some(text);
            }
        }
        None
    }

    fn first_text(&self, row: &ElementRef, selectors: &[Selector]) -> Option<String> {
        for sel in selectors {
            if let Some(cell) = row.select(sel).next() {
                return Some(sanitize_text(&cell.text().collect::<String>()));
            }
        }
        None
    }
}

/// Whether a container is associated with the requested channel
fn container_matches_channel(el: &ElementRef, channel: &ChannelDescriptor) -> bool {
    let id = channel.id.to_lowercase();
    let name = channel.display_name.to_lowercase();

    for attr in ["data-channel", "id", "class", "title"] {
        if let Some(value) = el.value().attr(attr) {
            let value = value.to_lowercase();
            if value.contains(&id) || (!name.is_empty() && value.contains(&name)) {
                return true;
            }
        }
    }

    // Heading immediately before the container
    for sibling in el.prev_siblings().filter_map(ElementRef::wrap).take(3) {
        if matches!(sibling.value().name(), "h1" | "h2" | "h3" | "h4" | "caption") {
            let text = sibling.text().collect::<String>().to_lowercase();
            if text.contains(&id) || (!name.is_empty() && text.contains(&name)) {
                return true;
            }
        }
    }

    // Leading text inside the container (caption rows and the like)
    let text = el.text().collect::<String>().to_lowercase();
    let head: String = text.chars().take(400).collect();
    head.contains(&id) || (!name.is_empty() && head.contains(&name))
}

/// The layout registry strategy
pub struct LayoutStrategy {
    layouts: Vec<SiteLayout>,
}

impl LayoutStrategy {
    /// Registry with the standard layouts
    #[must_use]
    pub fn standard() -> Self {
        Self {
            layouts: vec![SiteLayout::table(), SiteLayout::list()],
        }
    }

    /// Layouts applicable to a locator: domain-hinted first, otherwise all
    fn applicable(&self, locator: &str) -> Vec<&SiteLayout> {
        if let Ok(domain) = extract_domain(locator) {
            let hinted: Vec<&SiteLayout> = self
                .layouts
                .iter()
                .filter(|l| l.matches_domain(&domain))
                .collect();
            if !hinted.is_empty() {
                return hinted;
            }
        }

        self.layouts.iter().collect()
    }
}

impl ExtractionStrategy for LayoutStrategy {
    fn name(&self) -> &'static str {
        "site-layout"
    }

    fn extract(
        &self,
        raw: &str,
        channel: &ChannelDescriptor,
    ) -> Result<Vec<RawEntry>, ExtractError> {
        let document = Html::parse_document(raw);

        for layout in self.applicable(&channel.source_locator) {
            match layout.extract(&document, channel) {
                Ok(entries) if !entries.is_empty() => {
                    tracing::debug!(
                        layout = layout.name,
                        channel = %channel.id,
                        entries = entries.len(),
                        "Site layout matched"
                    );
                    return Ok(entries);
                }
                Ok(_) | Err(_) => continue,
            }
        }

        Err(ExtractError::NoContainer(channel.id.clone()))
    }
}
