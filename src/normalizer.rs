//! Maps loose extraction output (model JSON or heuristic result) into a `Transaction`.
//!
//! Normalization is total: every field that is absent, blank, negative or of the
//! wrong JSON type takes its documented default instead of failing.

use chrono::{Local, NaiveDate};
use serde_json::Value;

use crate::fallback::{parse_date_token, parse_decimal};
use crate::transaction_model::{
    truncate_chars, InputMethod, LineItem, Transaction, DEFAULT_CATEGORY, DEFAULT_ESTABLISHMENT,
    RAW_TEXT_LIMIT,
};

/// Normalize an extraction result, using today as the default date
pub fn normalize(extracted: &Value, input_method: InputMethod, tenant_id: &str) -> Transaction {
    normalize_on(extracted, input_method, tenant_id, Local::now().date_naive())
}

/// Normalize an extraction result with an explicit processing date
pub fn normalize_on(
    extracted: &Value,
    input_method: InputMethod,
    tenant_id: &str,
    today: NaiveDate,
) -> Transaction {
    let mut transaction = Transaction::dated(tenant_id, input_method, today);

    transaction.establishment =
        text_field(extracted.get("establishment")).unwrap_or_else(|| DEFAULT_ESTABLISHMENT.to_string());
    transaction.date = extracted
        .get("date")
        .and_then(Value::as_str)
        .and_then(parse_date_token)
        .unwrap_or(today);
    transaction.total_amount = amount_field(extracted.get("total_amount")).unwrap_or(0.0);
    transaction.category =
        text_field(extracted.get("category")).unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    transaction.raw_text = extracted
        .get("raw_text")
        .and_then(Value::as_str)
        .map(|raw| truncate_chars(raw, RAW_TEXT_LIMIT))
        .unwrap_or_default();
    transaction.items = extracted.get("items").map(normalize_items).unwrap_or_default();

    transaction
}

/// Normalize an `items` array, skipping entries that are not objects
pub fn normalize_items(items: &Value) -> Vec<LineItem> {
    let Some(items) = items.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| {
            let quantity = amount_field(item.get("quantity"))
                .filter(|quantity| *quantity > 0.0)
                .unwrap_or(1.0);
            let unit_price = amount_field(item.get("unit_price"));
            let total_price = amount_field(item.get("total_price"));

            LineItem {
                description: text_field(item.get("description")).unwrap_or_else(|| "Item".to_string()),
                quantity,
                unit_price: unit_price
                    .or_else(|| total_price.map(|total| total / quantity))
                    .unwrap_or(0.0),
                total_price: total_price
                    .or_else(|| unit_price.map(|unit| unit * quantity))
                    .unwrap_or(0.0),
                category: text_field(item.get("category"))
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            }
        })
        .collect()
}

fn text_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Non-negative amount from a JSON number or a numeric string such as "R$ 1.234,56"
fn amount_field(value: Option<&Value>) -> Option<f64> {
    let amount = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let cleaned = text
                .trim()
                .trim_start_matches("R$")
                .trim_end_matches("reais")
                .trim();
            parse_decimal(cleaned)
        }
        _ => None,
    }?;

    (amount.is_finite() && amount >= 0.0).then_some(amount)
}
