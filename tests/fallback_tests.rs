//! Heuristic extraction feeding the normalizer, as it runs when the model is unusable.

use chrono::NaiveDate;
use fintracker::fallback::{categorize, extract_heuristic_on, find_amount, CATEGORY_KEYWORDS};
use fintracker::normalizer::normalize_on;
use fintracker::transaction_model::{InputMethod, DEFAULT_CATEGORY, DEFAULT_ESTABLISHMENT};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 8).unwrap()
}

#[test]
fn test_heuristic_result_normalizes_cleanly() {
    let fields = extract_heuristic_on("Supermercado Dia 05/09/2025 total R$ 1.234,56", today());
    let transaction = normalize_on(&fields, InputMethod::Image, "321", today());

    assert_eq!(transaction.tenant_id, "321");
    assert_eq!(transaction.establishment, DEFAULT_ESTABLISHMENT);
    assert_eq!(transaction.date_iso(), "2025-09-05");
    assert_eq!(transaction.total_amount, 1234.56);
    assert_eq!(transaction.category, "Mercado");
    assert!(transaction.items.is_empty());
    assert_eq!(
        transaction.raw_text,
        "Supermercado Dia 05/09/2025 total R$ 1.234,56"
    );
}

#[test]
fn test_empty_text_yields_all_defaults() {
    let fields = extract_heuristic_on("", today());
    let transaction = normalize_on(&fields, InputMethod::Image, "1", today());

    assert_eq!(transaction.date, today());
    assert_eq!(transaction.total_amount, 0.0);
    assert_eq!(transaction.category, DEFAULT_CATEGORY);
    assert_eq!(transaction.raw_text, "");
}

#[test]
fn test_amount_marker_variants() {
    let cases = [
        ("Paguei R$45 no posto", Some(45.0)),
        ("r$ 9,99 de café", Some(9.99)),
        ("Foram 35 REAIS de uber", Some(35.0)),
        ("Conta de luz: 180,45 reais", Some(180.45)),
        ("Comprei 2 livros", None),
    ];

    for (text, expected) in cases {
        assert_eq!(find_amount(text), expected, "amount in {text:?}");
    }
}

#[test]
fn test_every_keyword_maps_to_its_group() {
    for (category, keywords) in CATEGORY_KEYWORDS {
        for keyword in *keywords {
            let text = format!("gasto com {keyword} hoje");
            let detected = categorize(&text);
            // Earlier groups win when a keyword overlaps
            let earlier_or_same = CATEGORY_KEYWORDS
                .iter()
                .position(|(name, _)| name == &detected)
                .unwrap()
                <= CATEGORY_KEYWORDS
                    .iter()
                    .position(|(name, _)| name == category)
                    .unwrap();
            assert!(earlier_or_same, "{keyword} detected as {detected}, expected {category}");
        }
    }
}

#[test]
fn test_uppercase_input_is_categorized() {
    assert_eq!(categorize("FARMÁCIA SÃO JOÃO"), "Saúde");
    assert_eq!(categorize("ALUGUEL DE SETEMBRO"), "Moradia");
    assert_eq!(categorize("Curso de inglês"), "Educação");
}
