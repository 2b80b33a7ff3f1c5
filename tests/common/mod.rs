//! Shared helpers for integration tests

use chrono::{DateTime, FixedOffset, TimeZone};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// The configured local zone used across tests (+07:00)
pub fn vn() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).unwrap()
}

/// Fixed reference clock: 2025-10-08 05:00:00 +07:00
pub fn reference() -> DateTime<FixedOffset> {
    vn().with_ymd_and_hms(2025, 10, 8, 5, 0, 0).unwrap()
}

/// Gzip-compress a payload the way `.xml.gz` sources ship it
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Write a channel registry file into `dir` and return its path
pub fn write_channels_file(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("channels.txt");
    std::fs::write(&path, content).unwrap();
    path
}

/// A small XMLTV feed fixture for one or two channels
pub fn xmltv_fixture() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="upstream">
  <channel id="vtv1">
    <display-name>VTV1 upstream</display-name>
    <icon src="https://img.example/vtv1.png"/>
  </channel>
  <programme start="20251008060000 +0700" stop="20251008070000 +0700" channel="vtv1">
    <title lang="vi">Chào buổi sáng</title>
    <desc lang="vi">Bản tin sáng</desc>
  </programme>
  <programme start="20251008070000 +0700" stop="20251008080000 +0700" channel="vtv1">
    <title lang="vi">Thời sự sáng</title>
  </programme>
</tv>
"#
    .to_string()
}

/// A schedule web page fixture (no structured feed) for channel HTV7
pub fn html_fixture() -> String {
    r#"<html><head><title>Lịch phát sóng</title></head><body>
<h2>Lịch phát sóng HTV7</h2>
<div class="lich-phat-song" data-channel="htv7">
  <li><span class="time">06:30</span><span class="name">Phim buổi sáng</span></li>
  <li><span class="time">08:00</span><span class="name">Ca nhạc</span></li>
</div>
</body></html>"#
        .to_string()
}
