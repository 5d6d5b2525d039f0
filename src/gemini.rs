//! # Gemini Extraction Client
//!
//! Sends text or receipt images to the Gemini `generateContent` endpoint and
//! turns the model's answer into a transaction-shaped JSON object.
//!
//! Model output is unreliable in format, so the client never lets a formatting
//! or upstream failure reach the user: it degrades to the heuristic extractor
//! in [`crate::fallback`] instead. Only `InvalidInput` is reported to callers.

use base64::Engine;
use chrono::{Local, NaiveDate};
use image::ImageFormat;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::ExtractionConfig;
use crate::errors::ExtractionError;
use crate::fallback::extract_heuristic;
use crate::transaction_model::{truncate_chars, CATEGORY_LABELS};

const API_KEY_HEADER: &str = "x-goog-api-key";
const ERROR_BODY_LIMIT: usize = 500;

const TEXT_PROMPT_TEMPLATE: &str = r#"Você é um especialista em análise de transações financeiras. Analise o texto abaixo e extraia as seguintes informações em formato JSON STRICT:

{
  "establishment": "Nome do estabelecimento ou loja",
  "date": "YYYY-MM-DD (use {today} se a data não for especificada)",
  "total_amount": 0.00,
  "category": "{categories}",
  "items": [
    {
      "description": "Descrição detalhada do item",
      "quantity": 1,
      "unit_price": 0.00,
      "total_price": 0.00,
      "category": "Categoria específica do item"
    }
  ],
  "raw_text": "Texto original para referência"
}

REGRAS ESTRITAS:
1. SEMPRE retorne um JSON válido
2. Para valores monetários, converta para números com duas casas decimais
3. Categorize inteligentemente baseado no contexto
4. Extraia o máximo de informações possível
5. Se não encontrar informações, use "Não especificado" para textos e 0.00 para valores

Exemplo de entrada: "comprei um mouse sem fio Mouse Sem Fio Logitech Signature M650 L Left - Grafite por 200,00 reais"
Exemplo de saída:
{
  "establishment": "Loja de Informática",
  "date": "{today}",
  "total_amount": 200.00,
  "category": "Tecnologia",
  "items": [
    {
      "description": "Mouse Sem Fio Logitech Signature M650 L Left - Grafite",
      "quantity": 1,
      "unit_price": 200.00,
      "total_price": 200.00,
      "category": "Periféricos"
    }
  ],
  "raw_text": "comprei um mouse sem fio Mouse Sem Fio Logitech Signature M650 L Left - Grafite por 200,00 reais"
}

TEXTO PARA ANÁLISE: {input}

Retorne APENAS o JSON válido, sem markdown ou texto adicional."#;

const IMAGE_PROMPT_TEMPLATE: &str = r#"Analise este documento financeiro (recibo, nota fiscal ou comprovante) e retorne APENAS um objeto JSON, sem markdown ou texto adicional, com os campos:
"establishment" (nome do estabelecimento), "date" (YYYY-MM-DD, use {today} se ausente), "total_amount" (número), "category" ({categories}), "items" (lista de objetos com "description", "quantity", "unit_price", "total_price", "category") e "raw_text" (texto lido no documento)."#;

/// Content submitted for analysis. Exactly one modality per call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionContent {
    Text(String),
    Image(Vec<u8>),
}

impl ExtractionContent {
    /// Build content from optional parts. The image wins when both are present.
    pub fn from_parts(text: Option<&str>, image: Option<&[u8]>) -> Result<Self, ExtractionError> {
        if let Some(bytes) = image.filter(|bytes| !bytes.is_empty()) {
            if text.is_some() {
                debug!("Both text and image supplied, analyzing the image only");
            }
            return Ok(ExtractionContent::Image(bytes.to_vec()));
        }

        match text.map(str::trim).filter(|text| !text.is_empty()) {
            Some(text) => Ok(ExtractionContent::Text(text.to_string())),
            None => Err(ExtractionError::InvalidInput(
                "no text or image supplied for analysis".to_string(),
            )),
        }
    }
}

/// Where the extracted fields came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    Model,
    Fallback,
}

/// Transaction-shaped JSON object plus its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub fields: Value,
    pub source: ExtractionSource,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

/// HTTP client for the Gemini `generateContent` endpoint
pub struct GeminiClient {
    http: Client,
    config: ExtractionConfig,
    breaker: CircuitBreaker,
}

impl GeminiClient {
    /// Create a client with the configured analysis timeout
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractionError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Ok(Self {
            http,
            config,
            breaker,
        })
    }

    /// Analyze a financial document given as text or image bytes.
    ///
    /// Fails only with `InvalidInput` when neither is supplied; every other
    /// failure is absorbed into heuristic extraction.
    pub async fn analyze_financial_document(
        &self,
        text: Option<&str>,
        image: Option<&[u8]>,
    ) -> Result<Extraction, ExtractionError> {
        let content = ExtractionContent::from_parts(text, image)?;
        Ok(self.extract(&content).await)
    }

    /// Extract transaction fields, degrading to heuristics on any upstream or format failure
    pub async fn extract(&self, content: &ExtractionContent) -> Extraction {
        if let ExtractionContent::Image(bytes) = content {
            if bytes.len() as u64 > self.config.max_image_bytes {
                warn!(
                    image_bytes = bytes.len(),
                    limit = self.config.max_image_bytes,
                    "Image too large for analysis, using heuristic extraction"
                );
                return fall_back(content, None);
            }
        }

        if self.breaker.is_open() {
            warn!(
                failures = self.breaker.failure_count(),
                "Extraction endpoint circuit open, using heuristic extraction"
            );
            return fall_back(content, None);
        }

        match self.generate(content).await {
            Ok(model_text) => {
                self.breaker.record_success();
                match parse_model_output(&model_text) {
                    Some(fields) => {
                        info!("Model extraction completed");
                        Extraction {
                            fields,
                            source: ExtractionSource::Model,
                        }
                    }
                    None => {
                        warn!(
                            response_length = model_text.len(),
                            "Model output carried no valid JSON object, using heuristic extraction"
                        );
                        fall_back(content, Some(model_text.as_str()))
                    }
                }
            }
            Err(e) => {
                if e.is_upstream_failure() {
                    self.breaker.record_failure();
                }
                warn!(error = %e, "Extraction request failed, using heuristic extraction");
                fall_back(content, None)
            }
        }
    }

    /// Send one request and return the model's text output
    async fn generate(&self, content: &ExtractionContent) -> Result<String, ExtractionError> {
        let request = build_request(content, Local::now().date_naive());

        let response = self
            .http
            .post(&self.config.endpoint)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "Extraction endpoint responded");

        let body = response.text().await?;
        if !status.is_success() {
            return Err(ExtractionError::Upstream {
                status: status.as_u16(),
                body: truncate_chars(&body, ERROR_BODY_LIMIT),
            });
        }

        model_text_from_envelope(&body)
    }
}

// Text inputs are re-read from the user's words; images only have the model's words, if any
fn fall_back(content: &ExtractionContent, model_text: Option<&str>) -> Extraction {
    let text = match content {
        ExtractionContent::Text(text) => text.as_str(),
        ExtractionContent::Image(_) => model_text.unwrap_or_default(),
    };
    Extraction {
        fields: extract_heuristic(text),
        source: ExtractionSource::Fallback,
    }
}

fn build_request(content: &ExtractionContent, today: NaiveDate) -> GenerateContentRequest {
    let parts = match content {
        ExtractionContent::Text(text) => vec![Part::Text {
            text: build_text_prompt(text, today),
        }],
        ExtractionContent::Image(bytes) => vec![
            Part::Text {
                text: build_image_prompt(today),
            },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: detect_image_mime(bytes).to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(bytes),
                },
            },
        ],
    };

    GenerateContentRequest {
        contents: vec![Content { parts }],
    }
}

/// Instruction prompt for a free-text transaction description
pub fn build_text_prompt(input: &str, today: NaiveDate) -> String {
    TEXT_PROMPT_TEMPLATE
        .replace("{today}", &today.format("%Y-%m-%d").to_string())
        .replace("{categories}", &CATEGORY_LABELS.join("/"))
        .replace("{input}", input)
}

/// Instruction prompt sent alongside an image
pub fn build_image_prompt(today: NaiveDate) -> String {
    IMAGE_PROMPT_TEMPLATE
        .replace("{today}", &today.format("%Y-%m-%d").to_string())
        .replace("{categories}", &CATEGORY_LABELS.join("/"))
}

/// MIME type from magic bytes. Telegram photos are JPEG, so that is the default.
pub fn detect_image_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => "image/jpeg",
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body
pub fn model_text_from_envelope(body: &str) -> Result<String, ExtractionError> {
    let envelope: Value = serde_json::from_str(body).map_err(|e| {
        ExtractionError::MalformedUpstreamResponse(format!("response body is not JSON: {e}"))
    })?;

    envelope
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ExtractionError::MalformedUpstreamResponse(
                "missing candidates[0].content.parts[0].text".to_string(),
            )
        })
}

/// Parse the model's text into a JSON object.
///
/// Tries the greedy span from the first `{` to the last `}` first, then the
/// first balanced brace span (prose after the object may contain braces too).
pub fn parse_model_output(text: &str) -> Option<Value> {
    let parse = |span: &str| serde_json::from_str::<Value>(span).ok();

    greedy_json_span(text)
        .and_then(parse)
        .or_else(|| balanced_json_span(text).and_then(parse))
        .filter(Value::is_object)
}

fn greedy_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn balanced_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
