//! # Fallback Extraction Module
//!
//! Deterministic, regex and keyword based extraction used whenever the model
//! output cannot be turned into structured data.
//!
//! ## Features
//!
//! - Date detection for `DD/MM/YYYY` and `YYYY-MM-DD` tokens
//! - Amount detection for `R$ 12,50` and `200 reais` forms, with comma or dot decimals
//! - Category detection through ordered keyword groups (first group wins)
//!
//! The result has the same shape as the model's JSON so it flows through the
//! same normalizer.

use chrono::{Local, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::transaction_model::{
    truncate_chars, DEFAULT_CATEGORY, DEFAULT_ESTABLISHMENT, RAW_TEXT_LIMIT,
};

const DATE_PATTERN: &str = r"(\d{2}/\d{2}/\d{4}|\d{4}-\d{2}-\d{2})";

// Thousands-grouped amounts ("1.234,56") are tried before plain decimals ("12,50", "200.00")
const AMOUNT_PATTERN: &str = r"(?i)R\$\s*(\d{1,3}(?:\.\d{3})+(?:,\d+)?|\d+(?:[.,]\d+)?)|\b(\d{1,3}(?:\.\d{3})+(?:,\d+)?|\d+(?:[.,]\d+)?)\s*reais\b";

lazy_static! {
    static ref DATE_REGEX: Regex = Regex::new(DATE_PATTERN).expect("Date pattern should be valid");
    static ref AMOUNT_REGEX: Regex =
        Regex::new(AMOUNT_PATTERN).expect("Amount pattern should be valid");
}

/// Keyword groups in priority order. The first group with any hit decides the category.
pub const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Mercado", &["mercado", "supermercado", "compras", "hipermercado"]),
    (
        "Alimentação",
        &["restaurante", "lanche", "pizza", "hambúrguer", "comida", "almoço", "jantar"],
    ),
    (
        "Transporte",
        &["combustível", "gasolina", "posto", "ônibus", "metro", "táxi", "uber"],
    ),
    (
        "Moradia",
        &["aluguel", "condomínio", "conta de luz", "água", "internet", "energia"],
    ),
    ("Saúde", &["farmácia", "remédio", "médico", "hospital", "consulta"]),
    ("Lazer", &["cinema", "shopping", "parque", "viagem", "hotel"]),
    ("Educação", &["livro", "curso", "faculdade", "escola", "material"]),
];

/// Extract a transaction-shaped JSON object from free text, dated today when no date is found
pub fn extract_heuristic(text: &str) -> Value {
    extract_heuristic_on(text, Local::now().date_naive())
}

/// Extract a transaction-shaped JSON object using `today` as the processing date
pub fn extract_heuristic_on(text: &str, today: NaiveDate) -> Value {
    let date = find_date(text).unwrap_or(today);
    let total_amount = find_amount(text).unwrap_or(0.0);
    let category = categorize(text);

    debug!(
        text_length = text.len(),
        total_amount,
        category,
        "Heuristic extraction completed"
    );

    json!({
        "establishment": DEFAULT_ESTABLISHMENT,
        "date": date.format("%Y-%m-%d").to_string(),
        "total_amount": total_amount,
        "category": category,
        "items": [],
        "raw_text": truncate_chars(text, RAW_TEXT_LIMIT),
    })
}

/// First date token in the text that names a real calendar day
pub fn find_date(text: &str) -> Option<NaiveDate> {
    DATE_REGEX
        .find_iter(text)
        .find_map(|token| parse_date_token(token.as_str()))
}

/// Parse `YYYY-MM-DD` or `DD/MM/YYYY`
pub fn parse_date_token(token: &str) -> Option<NaiveDate> {
    let token = token.trim();
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(token, "%d/%m/%Y"))
        .ok()
}

/// First currency-marked amount in the text
pub fn find_amount(text: &str) -> Option<f64> {
    let captures = AMOUNT_REGEX.captures(text)?;
    let number = captures.get(1).or_else(|| captures.get(2))?;
    parse_decimal(number.as_str())
}

/// Parse a Brazilian or plain decimal number ("1.234,56", "12,50", "200.00")
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let normalized = if raw.contains(',') && raw.contains('.') {
        raw.replace('.', "").replace(',', ".")
    } else if raw.contains(',') {
        raw.replace(',', ".")
    } else if is_thousands_grouped(raw) {
        raw.replace('.', "")
    } else {
        raw.to_string()
    };
    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

// "1.500" or "12.345.678": every group after the first has exactly three digits
fn is_thousands_grouped(raw: &str) -> bool {
    let mut groups = raw.split('.');
    let first = groups.next().unwrap_or_default();
    let rest: Vec<&str> = groups.collect();
    !rest.is_empty()
        && (1..=3).contains(&first.len())
        && rest.iter().all(|group| group.len() == 3)
}

/// Category from the first keyword group with a substring hit
pub fn categorize(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}
