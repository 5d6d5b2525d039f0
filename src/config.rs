//! # Configuration Module
//!
//! This module defines the runtime configuration: credentials, storage location,
//! extraction endpoint settings and transport mode. Everything is read from the
//! environment (after `.env` has been loaded by `main`).

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

// Constants for extraction configuration
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const ANALYSIS_TIMEOUT_SECS: u64 = 45;
pub const TRANSPORT_TIMEOUT_SECS: u64 = 30;
pub const MAX_IMAGE_SIZE: u64 = 10 * 1024 * 1024; // 10MB limit for uploaded images
pub const DEFAULT_DATABASE_FILE: &str = "financial_data.db";
pub const DEFAULT_WEBHOOK_ADDR: &str = "0.0.0.0:8443";

/// Circuit breaker settings for the extraction endpoint
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive upstream failures before requests are skipped
    pub failure_threshold: u32,
    /// Seconds to skip requests once the threshold is reached
    pub reset_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_secs: 60, // 1 minute
        }
    }
}

/// Settings for the generative-AI extraction client
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// API key sent in the `x-goog-api-key` header
    pub api_key: String,
    /// Full `generateContent` URL
    pub endpoint: String,
    /// Overall timeout for one analysis call, in seconds
    pub timeout_secs: u64,
    /// Images above this size are not sent to the model
    pub max_image_bytes: u64,
    pub breaker: BreakerConfig,
}

impl ExtractionConfig {
    /// Configuration for the default Gemini model at the public endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(
            api_key,
            generate_content_url(DEFAULT_GEMINI_API_BASE, DEFAULT_GEMINI_MODEL),
        )
    }

    /// Configuration pointing at an explicit endpoint URL
    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            timeout_secs: ANALYSIS_TIMEOUT_SECS,
            max_image_bytes: MAX_IMAGE_SIZE,
            breaker: BreakerConfig::default(),
        }
    }
}

/// Build the `generateContent` URL for a model
pub fn generate_content_url(api_base: &str, model: &str) -> String {
    format!(
        "{}/models/{}:generateContent",
        api_base.trim_end_matches('/'),
        model
    )
}

/// Push-mode settings. Without them the bot long-polls.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookConfig {
    /// Public URL Telegram posts updates to
    pub url: String,
    /// Local address the HTTP listener binds
    pub listen_addr: SocketAddr,
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub extraction: ExtractionConfig,
    pub database_path: PathBuf,
    pub webhook: Option<WebhookConfig>,
    /// Timeout for Telegram API calls and file downloads, in seconds
    pub transport_timeout_secs: u64,
    /// Chats allowed to wipe every tenant's data
    pub admin_chat_ids: Vec<i64>,
}

impl AppConfig {
    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let api_key = get("GEMINI_API_KEY").context("GEMINI_API_KEY must be set")?;

        let api_base = get("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string());
        let model = get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let extraction =
            ExtractionConfig::with_endpoint(api_key, generate_content_url(&api_base, &model));

        let database_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DATABASE_FILE));

        let webhook = match get("WEBHOOK_URL") {
            Some(url) => {
                let addr = get("WEBHOOK_ADDR").unwrap_or_else(|| DEFAULT_WEBHOOK_ADDR.to_string());
                let listen_addr = addr
                    .parse::<SocketAddr>()
                    .with_context(|| format!("WEBHOOK_ADDR is not a socket address: {addr}"))?;
                Some(WebhookConfig { url, listen_addr })
            }
            None => None,
        };

        let admin_chat_ids = match get("ADMIN_CHAT_IDS") {
            Some(raw) => parse_chat_ids(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            telegram_bot_token,
            extraction,
            database_path,
            webhook,
            transport_timeout_secs: TRANSPORT_TIMEOUT_SECS,
            admin_chat_ids,
        })
    }
}

fn parse_chat_ids(raw: &str) -> Result<Vec<i64>> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<i64>() {
            Ok(id) => ids.push(id),
            Err(_) => bail!("ADMIN_CHAT_IDS contains an invalid chat id: {part}"),
        }
    }
    Ok(ids)
}
