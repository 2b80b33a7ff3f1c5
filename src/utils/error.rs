//! Error types for the lichtv aggregator
//!
//! This module defines custom error types used throughout the application.

use thiserror::Error;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded")]
    MaxRetriesExceeded,

    /// Payload decompression or decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether another attempt could succeed
    ///
    /// Retryable: timeouts and 429/500/502/503/504 responses. Client errors
    /// (400, 401, 403, 404) and everything else fail immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ServerError(429 | 500 | 502 | 503 | 504)
        )
    }
}

/// Errors that can occur during schedule extraction
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Content does not parse as the expected structured feed
    #[error("Content is not a recognizable structured feed")]
    NotStructured,

    /// No layout container matched the channel
    #[error("No layout container matched channel '{0}'")]
    NoContainer(String),

    /// A container matched but yielded no programme rows
    #[error("No programme rows found")]
    NoRows,
}

/// Errors that can occur while normalizing time text
#[derive(Error, Debug)]
pub enum TimeError {
    /// Time text matched no known representation
    #[error("Unparseable time text: '{0}'")]
    Unparseable(String),

    /// Parsed fields do not form a valid instant
    #[error("Invalid instant: '{0}'")]
    InvalidInstant(String),
}
