//! XMLTV document writer
//!
//! Assembles the final output document from the merged per-channel entries.
//! Pure serialization: one generator-tagged `tv` root, ordered `channel`
//! elements, then ordered `programme` elements with
//! `YYYYMMDDHHMMSS ±HHMM` start/stop attributes.

use chrono::{DateTime, FixedOffset};
use std::path::{Path, PathBuf};

use crate::channels::ChannelMeta;
use crate::error::Result;
use crate::merge::MergedSchedule;

/// Generator tag carried on the document root
const GENERATOR_NAME: &str = concat!("lichtv/", env!("CARGO_PKG_VERSION"));

/// XMLTV document writer
#[derive(Debug, Clone)]
pub struct XmltvWriter {
    /// Language attribute for display names, titles and descriptions
    language: String,

    /// Title substituted when a programme carried none
    placeholder_title: String,
}

impl XmltvWriter {
    #[must_use]
    pub fn new(language: impl Into<String>, placeholder_title: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            placeholder_title: placeholder_title.into(),
        }
    }

    /// Render the document as a string
    ///
    /// Channels appear in the given order; programmes are grouped per
    /// channel in that same order, each group already sorted by start.
    #[must_use]
    pub fn render(&self, channels: &[ChannelMeta], schedule: &MergedSchedule) -> String {
        let mut doc = String::with_capacity(4096);
        doc.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        doc.push_str("<!DOCTYPE tv SYSTEM \"xmltv.dtd\">\n");
        doc.push_str(&format!(
            "<tv generator-info-name=\"{}\">\n",
            attr(GENERATOR_NAME)
        ));

        for ch in channels {
            doc.push_str(&format!("  <channel id=\"{}\">\n", attr(&ch.id)));
            doc.push_str(&format!(
                "    <display-name lang=\"{}\">{}</display-name>\n",
                attr(&self.language),
                text(&ch.display_name)
            ));
            if let Some(icon) = &ch.icon {
                doc.push_str(&format!("    <icon src=\"{}\"/>\n", attr(icon)));
            }
            doc.push_str("  </channel>\n");
        }

        for ch in channels {
            for entry in schedule.channel_entries(&ch.id) {
                doc.push_str(&format!(
                    "  <programme start=\"{}\" stop=\"{}\" channel=\"{}\">\n",
                    format_xmltv_time(entry.start),
                    format_xmltv_time(entry.stop),
                    attr(&ch.id)
                ));

                let title = if entry.title.is_empty() {
                    self.placeholder_title.as_str()
                } else {
                    entry.title.as_str()
                };
                doc.push_str(&format!(
                    "    <title lang=\"{}\">{}</title>\n",
                    attr(&self.language),
                    text(title)
                ));

                if !entry.description.is_empty() {
                    doc.push_str(&format!(
                        "    <desc lang=\"{}\">{}</desc>\n",
                        attr(&self.language),
                        text(&entry.description)
                    ));
                }

                doc.push_str("  </programme>\n");
            }
        }

        doc.push_str("</tv>\n");
        doc
    }

    /// Render and write the document, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the path cannot be created or written.
    pub fn write(
        &self,
        path: &Path,
        channels: &[ChannelMeta],
        schedule: &MergedSchedule,
    ) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, self.render(channels, schedule))?;
        Ok(path.to_path_buf())
    }
}

/// Format an instant as XMLTV `YYYYMMDDHHMMSS ±HHMM`
#[must_use]
pub fn format_xmltv_time(dt: DateTime<FixedOffset>) -> String {
    dt.format("%Y%m%d%H%M%S %z").to_string()
}

fn text(value: &str) -> String {
    html_escape::encode_text(value).into_owned()
}

fn attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).into_owned()
}
