//! HTTP source fetcher with rate limiting and payload decompression
//!
//! This module provides the fetcher used to download schedule sources, with
//! features including:
//! - User-Agent rotation (or a fixed configured agent)
//! - Rate limiting with governor
//! - Automatic retry with exponential backoff on retryable statuses
//! - Transparent gzip payload decompression (`.xml.gz` sources)
//! - Lossy UTF-8 decoding for sources with stray bytes
//! - Optional upstream HTTP proxy for sources that block direct fetches
//!
//! Transport-level gzip (`Content-Encoding: gzip`) is reversed by reqwest;
//! this module additionally reverses gzip applied to the payload itself
//! (`.xml.gz` sources), detected by the gzip magic bytes.

use bytes::Bytes;
use encoding_rs::UTF_8;
use flate2::read::GzDecoder;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT},
    Client,
};
use std::io::Read;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::config::FetchConfig;
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Gzip stream magic bytes
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Schedule source fetcher
///
/// One fetcher instance is shared by all source workers in a run; the rate
/// limiter throttles across them.
pub struct SourceFetcher {
    /// HTTP client with configured timeout, compression and optional proxy
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Maximum number of retry attempts for failed requests
    max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    base_delay_ms: u64,

    /// Fixed User-Agent override; pool rotation when unset
    user_agent: Option<String>,
}

impl SourceFetcher {
    /// Create a new fetcher from configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created and
    /// `FetchError::InvalidUrl` if the configured proxy URL is unusable.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .cookie_store(true);

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| FetchError::InvalidUrl(format!("proxy {proxy_url}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;

        let rate = NonZeroU32::new(config.rate_limit).unwrap_or(NonZeroU32::new(1).unwrap());
        let quota = Quota::per_second(rate);
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            max_retries: config.max_retries,
            base_delay_ms: 1000,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Fetch a source and return its decoded text
    ///
    /// This is the main entry point: rate limiting, retry with backoff,
    /// payload decompression and text decoding in one call.
    ///
    /// # Errors
    ///
    /// Returns various `FetchError` variants depending on the failure mode
    pub async fn fetch(&self, locator: &str) -> Result<String, FetchError> {
        let bytes = self.fetch_bytes(locator).await?;
        self.decode_payload(&bytes, locator)
    }

    /// Fetch a source's raw bytes with retry logic and rate limiting
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` for unparseable locators and
    /// `FetchError::MaxRetriesExceeded` if all retries fail
    pub async fn fetch_bytes(&self, locator: &str) -> Result<Bytes, FetchError> {
        Url::parse(locator).map_err(|e| FetchError::InvalidUrl(format!("{locator}: {e}")))?;

        // Wait for rate limiter
        self.rate_limiter.until_ready().await;

        self.fetch_with_retry(locator).await
    }

    /// Fetch with exponential backoff retry logic
    ///
    /// Retryability is decided by [`FetchError::is_retryable`]; client
    /// errors return immediately.
    async fn fetch_with_retry(&self, locator: &str) -> Result<Bytes, FetchError> {
        let retry = RetryConfig::with_delays(self.max_retries, self.base_delay_ms, 30_000);

        with_retry_if(
            &retry,
            || async {
                self.attempt(locator)
                    .await
                    .map_err(anyhow::Error::new)
            },
            |e| {
                e.downcast_ref::<FetchError>()
                    .map(FetchError::is_retryable)
                    .unwrap_or(false)
            },
        )
        .await
        .map_err(|e| {
            e.downcast::<FetchError>()
                .unwrap_or(FetchError::MaxRetriesExceeded)
        })
    }

    /// One request attempt against a source
    async fn attempt(&self, locator: &str) -> Result<Bytes, FetchError> {
        let headers = self.build_headers();

        let response = self
            .client
            .get(locator)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ServerError(status.as_u16()));
        }

        Ok(response.bytes().await?)
    }

    /// Decode a source payload to text
    ///
    /// Reverses gzip applied to the payload itself (detected by the gzip
    /// magic bytes, which also covers `.gz` locators), then decodes as
    /// UTF-8. Stray invalid bytes are replaced rather than failing the
    /// source.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Decode` if gzip decompression fails
    pub fn decode_payload(&self, bytes: &[u8], locator: &str) -> Result<String, FetchError> {
        let looks_gzipped = bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC;

        let data: Vec<u8> = if looks_gzipped {
            let mut decoder = GzDecoder::new(bytes);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| FetchError::Decode(format!("gzip: {e}")))?;
            out
        } else {
            // A .gz locator whose payload was already decompressed in
            // transit arrives without the magic bytes; decode as plain
            bytes.to_vec()
        };

        let (cow, _encoding, had_errors) = UTF_8.decode(&data);
        if had_errors {
            warn!(locator, "Source contained invalid UTF-8; replaced");
        }

        Ok(cow.into_owned())
    }

    /// Build HTTP headers for a source request
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        match &self.user_agent {
            Some(agent) => {
                if let Ok(value) = HeaderValue::from_str(agent) {
                    headers.insert(USER_AGENT, value);
                }
            }
            None => {
                headers.insert(USER_AGENT, HeaderValue::from_static(self.random_user_agent()));
            }
        }

        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("vi-VN,vi;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate, br"),
        );

        headers
    }

    /// Get a random user agent from the pool
    fn random_user_agent(&self) -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn test_config() -> FetchConfig {
        FetchConfig {
            max_concurrent_sources: 4,
            rate_limit: 10,
            request_timeout_secs: 30,
            max_retries: 2,
            proxy: None,
            user_agent: None,
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_fetcher_creation() {
        let fetcher = SourceFetcher::new(&test_config());
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let mut config = test_config();
        config.proxy = Some("::not a url::".to_string());
        let fetcher = SourceFetcher::new(&config);
        assert!(matches!(fetcher, Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn test_user_agent_rotation() {
        let fetcher = SourceFetcher::new(&test_config()).unwrap();

        let mut agents = std::collections::HashSet::new();
        for _ in 0..100 {
            let agent = fetcher.random_user_agent();
            assert!(USER_AGENTS.contains(&agent));
            agents.insert(agent);
        }

        assert!(agents.len() > 1, "User agents should rotate");
    }

    #[test]
    fn test_fixed_user_agent_header() {
        let mut config = test_config();
        config.user_agent = Some("lichtv/0.2".to_string());
        let fetcher = SourceFetcher::new(&config).unwrap();

        let headers = fetcher.build_headers();
        assert_eq!(headers.get(USER_AGENT).unwrap().to_str().unwrap(), "lichtv/0.2");
    }

    #[test]
    fn test_decode_plain_utf8() {
        let fetcher = SourceFetcher::new(&test_config()).unwrap();
        let text = "<tv><channel id=\"vtv1\"/></tv>";
        let decoded = fetcher.decode_payload(text.as_bytes(), "https://a.example/epg.xml");
        assert_eq!(decoded.unwrap(), text);
    }

    #[test]
    fn test_decode_gzip_by_magic() {
        let fetcher = SourceFetcher::new(&test_config()).unwrap();
        let text = "<tv><programme channel=\"vtv1\"/></tv>";
        let compressed = gzip(text.as_bytes());

        // Locator without .gz suffix; detection by magic bytes
        let decoded = fetcher.decode_payload(&compressed, "https://a.example/api/epg");
        assert_eq!(decoded.unwrap(), text);
    }

    #[test]
    fn test_decode_gz_locator_with_plain_payload() {
        let fetcher = SourceFetcher::new(&test_config()).unwrap();
        let text = "<tv></tv>";

        // Transport already decompressed the payload; .gz suffix alone must
        // not force a gzip parse
        let decoded = fetcher.decode_payload(text.as_bytes(), "https://a.example/epg.xml.gz");
        assert_eq!(decoded.unwrap(), text);
    }

    #[test]
    fn test_decode_truncated_gzip_fails() {
        let fetcher = SourceFetcher::new(&test_config()).unwrap();
        let mut compressed = gzip(b"<tv></tv>");
        compressed.truncate(6);

        let decoded = fetcher.decode_payload(&compressed, "https://a.example/epg.xml.gz");
        assert!(matches!(decoded, Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        let fetcher = SourceFetcher::new(&test_config()).unwrap();
        let mut data = b"<tv>ti\xFFtle</tv>".to_vec();
        data.push(b'\n');

        let decoded = fetcher.decode_payload(&data, "https://a.example/epg.xml").unwrap();
        assert!(decoded.contains('\u{FFFD}'));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(FetchError::ServerError(429).is_retryable());
        assert!(FetchError::ServerError(500).is_retryable());
        assert!(FetchError::ServerError(502).is_retryable());
        assert!(FetchError::ServerError(503).is_retryable());
        assert!(FetchError::ServerError(504).is_retryable());
        assert!(FetchError::Timeout.is_retryable());

        assert!(!FetchError::ServerError(400).is_retryable());
        assert!(!FetchError::ServerError(401).is_retryable());
        assert!(!FetchError::ServerError(403).is_retryable());
        assert!(!FetchError::ServerError(404).is_retryable());
        assert!(!FetchError::MaxRetriesExceeded.is_retryable());
    }
}
