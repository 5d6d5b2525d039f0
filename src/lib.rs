//! # FinTracker Telegram Bot
//!
//! A Telegram bot that turns receipt photos, voice notes and free-text
//! descriptions into structured financial transactions using the Gemini API,
//! falls back to heuristic parsing when the model output is unusable, and
//! keeps a per-chat ledger in SQLite.

pub mod bot;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod errors;
pub mod fallback;
pub mod gemini;
pub mod localization;
pub mod normalizer;
pub mod pipeline;
pub mod speech;
pub mod transaction_model;
