//! # Transaction Data Model
//!
//! This module defines the ledger entities produced by the extraction pipeline.
//!
//! ## Core Concepts
//!
//! - **Transaction**: one recorded financial event, owned by a tenant (chat)
//! - **LineItem**: a single good or service inside a transaction
//! - **InputMethod**: the channel the event arrived through
//!
//! Every field except `tenant_id` and `input_method` is best effort and holds
//! a documented default when extraction could not determine it.
//!
//! ## Usage
//!
//! ```rust
//! use fintracker::transaction_model::{InputMethod, LineItem, Transaction};
//!
//! let mut transaction = Transaction::new("12345", InputMethod::Text);
//! transaction.total_amount = 200.0;
//! transaction.items.push(LineItem::new("Mouse sem fio", 1.0, 200.0));
//! assert_eq!(transaction.category, "Outros");
//! ```

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Establishment stored when none could be extracted
pub const DEFAULT_ESTABLISHMENT: &str = "Estabelecimento não identificado";

/// Category stored when none could be extracted
pub const DEFAULT_CATEGORY: &str = "Outros";

/// Maximum number of characters of input kept in `raw_text`
pub const RAW_TEXT_LIMIT: usize = 1000;

/// Category labels offered to the model, in display order
pub const CATEGORY_LABELS: &[&str] = &[
    "Tecnologia",
    "Alimentação",
    "Transporte",
    "Moradia",
    "Saúde",
    "Lazer",
    "Educação",
    "Mercado",
    "Serviços",
    DEFAULT_CATEGORY,
];

/// Channel through which an inbound event arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMethod {
    Text,
    Image,
    Voice,
}

impl InputMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputMethod::Text => "text",
            InputMethod::Image => "image",
            InputMethod::Voice => "voice",
        }
    }
}

impl fmt::Display for InputMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(InputMethod::Text),
            "image" => Ok(InputMethod::Image),
            "voice" => Ok(InputMethod::Voice),
            other => Err(format!("Unknown input method: {other}")),
        }
    }
}

/// A single good or service within a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Free-text description (e.g., "Mouse Sem Fio Logitech M650")
    pub description: String,
    /// Positive quantity, 1 when unknown
    pub quantity: f64,
    /// Non-negative price per unit
    pub unit_price: f64,
    /// Non-negative price for the whole line
    pub total_price: f64,
    /// Item-level category, independent of the transaction category
    pub category: String,
}

impl LineItem {
    /// Create an item whose total is `quantity * unit_price`
    pub fn new(description: impl Into<String>, quantity: f64, unit_price: f64) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            total_price: quantity * unit_price,
            category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

/// One recorded financial event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Storage identifier, `None` until persisted
    pub id: Option<i64>,
    /// Tenant (chat) that owns the transaction
    pub tenant_id: String,
    pub establishment: String,
    pub date: NaiveDate,
    pub total_amount: f64,
    pub category: String,
    /// Original or transcribed input, at most `RAW_TEXT_LIMIT` characters
    pub raw_text: String,
    pub input_method: InputMethod,
    pub items: Vec<LineItem>,
    /// Assigned by the ledger store from the system clock
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a transaction holding only defaults, dated today
    pub fn new(tenant_id: impl Into<String>, input_method: InputMethod) -> Self {
        Self::dated(tenant_id, input_method, Local::now().date_naive())
    }

    /// Create a transaction holding only defaults for the given processing date
    pub fn dated(tenant_id: impl Into<String>, input_method: InputMethod, date: NaiveDate) -> Self {
        Self {
            id: None,
            tenant_id: tenant_id.into(),
            establishment: DEFAULT_ESTABLISHMENT.to_string(),
            date,
            total_amount: 0.0,
            category: DEFAULT_CATEGORY.to_string(),
            raw_text: String::new(),
            input_method,
            items: Vec::new(),
            processed_at: None,
        }
    }

    /// Serialized copy of the items, stored next to the per-item rows
    pub fn items_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.items)
    }

    /// ISO date string (`YYYY-MM-DD`)
    pub fn date_iso(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    /// Whether the transaction carries a usable amount
    pub fn has_amount(&self) -> bool {
        self.total_amount > 0.0
    }
}

/// Truncate text to at most `limit` characters, respecting char boundaries
pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
