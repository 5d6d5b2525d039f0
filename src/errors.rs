//! # Error Types Module
//!
//! This module defines the error types used across the extraction, storage and
//! transport layers. Only extraction errors cross a public boundary: the ledger
//! store logs its own failures and reports neutral values, and transport
//! failures are logged where they happen.

use thiserror::Error;

/// Errors raised while talking to the generative-AI endpoint
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Neither text nor image content was supplied
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The endpoint answered with a non-success status
    #[error("Upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The response envelope did not have the expected shape
    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// Network failure or timeout
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ExtractionError {
    /// Whether the pipeline may degrade to heuristic extraction.
    ///
    /// `InvalidInput` is a caller bug and has nothing to fall back on.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, ExtractionError::InvalidInput(_))
    }

    /// Whether the failure says something about the endpoint's health
    pub fn is_upstream_failure(&self) -> bool {
        self.allows_fallback()
    }
}

/// Errors raised inside the ledger store. Never escapes `LedgerStore`'s public API.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while delivering replies or fetching files from Telegram
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("File download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("File too large: {0} bytes")]
    FileTooLarge(u64),
}
