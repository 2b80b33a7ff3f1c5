//! Unified error handling for the lichtv crate
//!
//! This module provides a unified error type that consolidates all
//! domain-specific errors into a single `Error` enum, while maintaining the
//! ability to use domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Per-source and per-entry errors are absorbed at their own boundary by the
//! pipeline; only a total failure to produce usable output propagates out of
//! the crate as an `Error`.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::utils::error::{ExtractError, FetchError, TimeError};

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, decompression)
    Network,
    /// Extraction and markup parsing errors
    Extraction,
    /// Time normalization errors
    Time,
    /// Configuration and validation errors
    Config,
    /// Output document and I/O errors
    Output,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the lichtv crate
///
/// This enum wraps all domain-specific errors, providing a single error type
/// that can be used across module boundaries while preserving the detailed
/// error information.
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Extraction-specific errors
    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Time normalization errors
    #[error("Time error: {0}")]
    Time(#[from] TimeError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// The channel registry is missing or empty
    #[error("Channel list unusable: {0}")]
    NoChannels(String),

    /// Every source failed and no output could be produced
    #[error("No usable output: {0}")]
    NoOutput(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Check if this error is recoverable (the run can continue past it)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => matches!(
                e,
                FetchError::Timeout | FetchError::ServerError(_) | FetchError::MaxRetriesExceeded
            ),
            Self::Extract(_) | Self::Time(_) => true,
            Self::Io(_) => true,
            Self::Http(_) => true,
            Self::Config(_) | Self::NoChannels(_) | Self::NoOutput(_) => false,
            Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) | Self::Http(_) => ErrorCategory::Network,
            Self::Extract(_) => ErrorCategory::Extraction,
            Self::Time(_) => ErrorCategory::Time,
            Self::Config(_) | Self::NoChannels(_) => ErrorCategory::Config,
            Self::Io(_) | Self::NoOutput(_) => ErrorCategory::Output,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
