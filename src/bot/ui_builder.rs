//! UI Builder module for formatting bot replies
//!
//! Replies use Telegram's legacy Markdown, so every user- or model-supplied
//! field goes through [`escape_markdown`] before it is embedded.

use crate::db::LedgerSummary;
use crate::dialogue::ClearScope;
use crate::localization::{t_args_lang, t_lang};
use crate::transaction_model::Transaction;

/// Escape the characters legacy Markdown treats as entity markers
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Two-decimal amount (e.g. `200.00`)
pub fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

/// Welcome text for `/start`
pub fn format_welcome(language_code: Option<&str>) -> String {
    [
        t_lang("welcome-title", language_code),
        t_lang("welcome-description", language_code),
        command_list(language_code),
        [
            t_lang("welcome-accepts", language_code),
            t_lang("accepts-photo", language_code),
            t_lang("accepts-voice", language_code),
            t_lang("accepts-text", language_code),
        ]
        .join("\n"),
    ]
    .join("\n\n")
}

/// Usage text for `/ajuda`
pub fn format_help(language_code: Option<&str>) -> String {
    [
        t_lang("help-title", language_code),
        t_lang("welcome-description", language_code),
        command_list(language_code),
        [
            t_lang("help-tips", language_code),
            t_lang("help-tip-amount", language_code),
            t_lang("help-tip-establishment", language_code),
            t_lang("help-tip-items", language_code),
        ]
        .join("\n"),
        t_lang("help-example", language_code),
    ]
    .join("\n\n")
}

fn command_list(language_code: Option<&str>) -> String {
    [
        t_lang("welcome-commands", language_code),
        t_lang("command-statement", language_code),
        t_lang("command-summary", language_code),
        t_lang("command-clear", language_code),
        t_lang("command-help", language_code),
    ]
    .join("\n")
}

/// Confirmation card for a recorded transaction
pub fn format_transaction_response(
    transaction: &Transaction,
    language_code: Option<&str>,
) -> String {
    let field = |key: &str, value: &str| t_args_lang(key, &[("value", value)], language_code);

    let mut message = format!(
        "{}\n\n{}\n{}\n{}\n{}\n",
        t_lang("transaction-recorded", language_code),
        field("field-establishment", &escape_markdown(&transaction.establishment)),
        field("field-date", &transaction.date_iso()),
        field("field-total", &format_amount(transaction.total_amount)),
        field("field-category", &escape_markdown(&transaction.category)),
    );

    if !transaction.items.is_empty() {
        message.push_str(&format!("\n{}\n", t_lang("items-title", language_code)));
        for item in &transaction.items {
            message.push_str(&format!(
                "   • {}: R$ {}\n",
                escape_markdown(&item.description),
                format_amount(item.total_price)
            ));
        }
    }

    message
}

/// Latest transactions for `/extrato`
pub fn format_statement(transactions: &[Transaction], language_code: Option<&str>) -> String {
    if transactions.is_empty() {
        return t_lang("statement-empty", language_code);
    }

    let mut message = format!("{}\n\n", t_lang("statement-title", language_code));
    for transaction in transactions {
        message.push_str(&format!(
            "🏪 {}\n   📅 {} | 💰 R$ {}\n   🏷️ {} | 📝 {}\n\n",
            escape_markdown(&transaction.establishment),
            transaction.date_iso(),
            format_amount(transaction.total_amount),
            escape_markdown(&transaction.category),
            transaction.input_method,
        ));
    }
    message
}

/// Category and month totals for `/resumo`
pub fn format_summary(summary: Option<&LedgerSummary>, language_code: Option<&str>) -> String {
    let Some(summary) = summary.filter(|summary| !summary.by_category.is_empty()) else {
        return t_lang("summary-empty", language_code);
    };

    let mut message = format!("{}\n\n", t_lang("summary-title", language_code));
    for entry in summary.by_category.iter().filter(|entry| entry.total > 0.0) {
        message.push_str(&format!(
            "🏷️ {}: R$ {}\n",
            escape_markdown(&entry.category),
            format_amount(entry.total)
        ));
    }

    if !summary.by_month.is_empty() {
        message.push_str(&format!("\n{}\n", t_lang("summary-months", language_code)));
        for entry in &summary.by_month {
            message.push_str(&format!("   {}: R$ {}\n", entry.month, format_amount(entry.total)));
        }
    }

    let total = format_amount(summary.total());
    message.push_str(&format!(
        "\n{}",
        t_args_lang("summary-total", &[("value", total.as_str())], language_code)
    ));
    message
}

/// Warning shown before a clear is confirmed
pub fn format_clear_prompt(scope: ClearScope, language_code: Option<&str>) -> String {
    let warning = match scope {
        ClearScope::Tenant => t_lang("clear-prompt", language_code),
        ClearScope::All => t_lang("clear-all-prompt", language_code),
    };
    format!("{}\n\n{}", warning, t_lang("clear-question", language_code))
}
