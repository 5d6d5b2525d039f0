//! # Integration Tests
//!
//! End-to-end tests for the extraction client and the ingestion pipeline,
//! with the Gemini endpoint mocked by wiremock and a throwaway SQLite ledger.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fintracker::config::{BreakerConfig, ExtractionConfig};
use fintracker::db::LedgerStore;
use fintracker::errors::ExtractionError;
use fintracker::gemini::{ExtractionContent, ExtractionSource, GeminiClient};
use fintracker::pipeline::{LedgerPipeline, PipelineOutcome};
use fintracker::speech::{PlaceholderTranscriber, SpeechTranscriber};
use fintracker::transaction_model::{InputMethod, DEFAULT_ESTABLISHMENT};

const MODEL_PATH: &str = "/v1beta/models/gemini-test:generateContent";

fn config_for(server: &MockServer) -> ExtractionConfig {
    ExtractionConfig::with_endpoint("test-key", format!("{}{}", server.uri(), MODEL_PATH))
}

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new(config_for(server)).unwrap()
}

fn envelope(text: &str) -> Value {
    json!({
        "candidates": [{"content": {"parts": [{"text": text}]}}]
    })
}

fn mouse_json() -> String {
    json!({
        "establishment": "Loja de Informática",
        "date": "2025-09-01",
        "total_amount": 200.00,
        "category": "Tecnologia",
        "items": [{
            "description": "Mouse Sem Fio Logitech Signature M650",
            "quantity": 1,
            "unit_price": 200.00,
            "total_price": 200.00,
            "category": "Periféricos"
        }],
        "raw_text": "comprei um mouse sem fio por 200,00 reais"
    })
    .to_string()
}

async fn respond_with(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_model_output_is_used_when_valid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_string_contains("comprei um mouse"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(&format!("```json\n{}\n```", mouse_json()))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let extraction = client_for(&server)
        .analyze_financial_document(Some("comprei um mouse por 200 reais"), None)
        .await
        .unwrap();

    assert_eq!(extraction.source, ExtractionSource::Model);
    assert_eq!(extraction.fields["total_amount"], 200.0);
    assert_eq!(extraction.fields["category"], "Tecnologia");
}

#[tokio::test]
async fn test_prose_output_falls_back_to_user_text() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(envelope("Desculpe, não entendi a transação.")),
    )
    .await;

    let extraction = client_for(&server)
        .analyze_financial_document(Some("Gastei 200 reais em um mouse"), None)
        .await
        .unwrap();

    assert_eq!(extraction.source, ExtractionSource::Fallback);
    assert_eq!(extraction.fields["total_amount"], 200.0);
    assert_eq!(extraction.fields["category"], "Outros");
    assert_eq!(extraction.fields["establishment"], DEFAULT_ESTABLISHMENT);
}

#[tokio::test]
async fn test_upstream_error_falls_back() {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(500).set_body_string("internal")).await;

    let extraction = client_for(&server)
        .analyze_financial_document(Some("Jantar no restaurante R$ 89,90"), None)
        .await
        .unwrap();

    assert_eq!(extraction.source, ExtractionSource::Fallback);
    assert_eq!(extraction.fields["total_amount"], 89.9);
    assert_eq!(extraction.fields["category"], "Alimentação");
}

#[tokio::test]
async fn test_malformed_envelope_falls_back() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"candidates": []})),
    )
    .await;

    let extraction = client_for(&server)
        .analyze_financial_document(Some("Uber R$ 23,40"), None)
        .await
        .unwrap();

    assert_eq!(extraction.source, ExtractionSource::Fallback);
    assert_eq!(extraction.fields["category"], "Transporte");
}

#[tokio::test]
async fn test_image_fallback_reads_model_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(body_string_contains("inline_data"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope("Cupom do supermercado, total R$ 45,90 em 15/08/2025")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let extraction = client_for(&server)
        .analyze_financial_document(None, Some(&[0xFFu8, 0xD8, 0xFF, 0xE0, 0, 0][..]))
        .await
        .unwrap();

    assert_eq!(extraction.source, ExtractionSource::Fallback);
    assert_eq!(extraction.fields["total_amount"], 45.9);
    assert_eq!(extraction.fields["category"], "Mercado");
    assert_eq!(extraction.fields["date"], "2025-08-15");
}

#[tokio::test]
async fn test_image_upstream_failure_yields_defaults() {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(503)).await;

    let extraction = client_for(&server)
        .extract(&ExtractionContent::Image(vec![1, 2, 3, 4]))
        .await;

    assert_eq!(extraction.source, ExtractionSource::Fallback);
    assert_eq!(extraction.fields["total_amount"], 0.0);
    assert_eq!(extraction.fields["category"], "Outros");
}

#[tokio::test]
async fn test_missing_input_is_rejected_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .analyze_financial_document(Some("   "), None)
        .await;

    assert!(matches!(result, Err(ExtractionError::InvalidInput(_))));
}

#[tokio::test]
async fn test_oversized_image_skips_the_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.max_image_bytes = 4;
    let client = GeminiClient::new(config).unwrap();

    let extraction = client.extract(&ExtractionContent::Image(vec![0; 16])).await;
    assert_eq!(extraction.source, ExtractionSource::Fallback);
}

#[tokio::test]
async fn test_circuit_opens_after_repeated_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.breaker = BreakerConfig {
        failure_threshold: 2,
        reset_secs: 60,
    };
    let client = GeminiClient::new(config).unwrap();

    for _ in 0..4 {
        let extraction = client
            .analyze_financial_document(Some("R$ 10,00 na farmácia"), None)
            .await
            .unwrap();
        assert_eq!(extraction.source, ExtractionSource::Fallback);
        assert_eq!(extraction.fields["category"], "Saúde");
    }
}

struct FixedTranscriber(&'static str);

#[async_trait]
impl SpeechTranscriber for FixedTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

async fn pipeline_for(
    server: &MockServer,
    transcriber: Arc<dyn SpeechTranscriber>,
) -> Result<(LedgerPipeline, TempDir)> {
    let dir = TempDir::new()?;
    let store = LedgerStore::open(dir.path().join("ledger.db")).await?;
    Ok((
        LedgerPipeline::new(client_for(server), store, transcriber),
        dir,
    ))
}

#[tokio::test]
async fn test_pipeline_records_text_transaction() -> Result<()> {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(envelope(&mouse_json())),
    )
    .await;
    let (pipeline, _dir) = pipeline_for(&server, Arc::new(PlaceholderTranscriber)).await?;

    let outcome = pipeline
        .record("42", Some("comprei um mouse por 200 reais"), None, InputMethod::Text)
        .await?;

    let PipelineOutcome::Recorded(transaction) = outcome else {
        panic!("expected a recorded transaction");
    };
    assert!(transaction.id.is_some());
    assert_eq!(transaction.tenant_id, "42");
    assert_eq!(transaction.input_method, InputMethod::Text);

    let recent = pipeline.recent("42").await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].establishment, "Loja de Informática");
    assert_eq!(recent[0].items.len(), 1);
    assert_eq!(recent[0].items[0].category, "Periféricos");

    let summary = pipeline.summary("42").await.unwrap();
    assert_eq!(summary.total(), 200.0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_refuses_text_without_amount() -> Result<()> {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(envelope(r#"{"establishment": "Padaria", "total_amount": 0}"#)),
    )
    .await;
    let (pipeline, _dir) = pipeline_for(&server, Arc::new(PlaceholderTranscriber)).await?;

    let outcome = pipeline
        .record("42", Some("fui na padaria"), None, InputMethod::Text)
        .await?;

    assert!(matches!(outcome, PipelineOutcome::MissingAmount(_)));
    assert_eq!(outcome.transaction().raw_text, "fui na padaria");
    assert!(pipeline.recent("42").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_pipeline_keeps_image_without_amount() -> Result<()> {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(500)).await;
    let (pipeline, _dir) = pipeline_for(&server, Arc::new(PlaceholderTranscriber)).await?;

    let outcome = pipeline
        .record("8", None, Some(&[0x89u8, b'P', b'N', b'G'][..]), InputMethod::Image)
        .await?;

    let PipelineOutcome::Recorded(transaction) = outcome else {
        panic!("expected a recorded transaction");
    };
    assert_eq!(transaction.establishment, DEFAULT_ESTABLISHMENT);
    assert_eq!(transaction.input_method, InputMethod::Image);
    assert_eq!(pipeline.recent("8").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_records_transcribed_voice() -> Result<()> {
    let server = MockServer::start().await;
    respond_with(&server, ResponseTemplate::new(502)).await;
    let (pipeline, _dir) =
        pipeline_for(&server, Arc::new(FixedTranscriber("Paguei R$ 35,00 no cinema"))).await?;

    let transcript = pipeline.transcribe(&[0u8; 32]).await?;
    let outcome = pipeline
        .record("5", Some(transcript.as_str()), None, InputMethod::Voice)
        .await?;

    let PipelineOutcome::Recorded(transaction) = outcome else {
        panic!("expected a recorded transaction");
    };
    assert_eq!(transaction.total_amount, 35.0);
    assert_eq!(transaction.category, "Lazer");
    assert_eq!(transaction.input_method, InputMethod::Voice);
    assert_eq!(transaction.raw_text, "Paguei R$ 35,00 no cinema");
    Ok(())
}

#[tokio::test]
async fn test_pipeline_reports_unpersisted_transaction() -> Result<()> {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(envelope(&mouse_json())),
    )
    .await;
    let (pipeline, _dir) = pipeline_for(&server, Arc::new(PlaceholderTranscriber)).await?;
    pipeline.store().close().await;

    let outcome = pipeline
        .record("42", Some("comprei um mouse por 200 reais"), None, InputMethod::Text)
        .await?;

    assert!(matches!(outcome, PipelineOutcome::NotPersisted(_)));
    Ok(())
}

#[tokio::test]
async fn test_pipeline_propagates_invalid_input() -> Result<()> {
    let server = MockServer::start().await;
    let (pipeline, _dir) = pipeline_for(&server, Arc::new(PlaceholderTranscriber)).await?;

    let result = pipeline.record("42", None, None, InputMethod::Text).await;
    assert!(matches!(result, Err(ExtractionError::InvalidInput(_))));
    Ok(())
}

#[tokio::test]
async fn test_pipeline_clear_scopes() -> Result<()> {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200).set_body_json(envelope(&mouse_json())),
    )
    .await;
    let (pipeline, _dir) = pipeline_for(&server, Arc::new(PlaceholderTranscriber)).await?;

    for tenant in ["1", "2"] {
        pipeline
            .record(tenant, Some("mouse 200 reais"), None, InputMethod::Text)
            .await?;
    }

    assert!(pipeline.clear(Some("1")).await);
    assert!(pipeline.recent("1").await.is_empty());
    assert_eq!(pipeline.recent("2").await.len(), 1);

    assert!(pipeline.clear(None).await);
    assert!(pipeline.recent("2").await.is_empty());
    Ok(())
}
