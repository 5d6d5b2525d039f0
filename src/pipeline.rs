//! Ingestion pipeline shared by every input channel.
//!
//! Text, photos and transcribed voice notes all take the same path:
//! extract, normalize, guard, save. The extractor, store and transcriber are
//! injected so tests can point them at a mock endpoint and a scratch database.

use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{LedgerStore, LedgerSummary};
use crate::errors::ExtractionError;
use crate::gemini::{ExtractionSource, GeminiClient};
use crate::normalizer::normalize;
use crate::speech::SpeechTranscriber;
use crate::transaction_model::{truncate_chars, InputMethod, Transaction, RAW_TEXT_LIMIT};

/// Number of entries shown by the statement view
pub const STATEMENT_LIMIT: u32 = 10;

/// Result of recording one inbound input
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Saved; `id` and `processed_at` are set
    Recorded(Transaction),
    /// Text input without a usable amount; nothing was saved
    MissingAmount(Transaction),
    /// Extraction worked but the store rejected the write
    NotPersisted(Transaction),
}

impl PipelineOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            PipelineOutcome::Recorded(t)
            | PipelineOutcome::MissingAmount(t)
            | PipelineOutcome::NotPersisted(t) => t,
        }
    }
}

pub struct LedgerPipeline {
    extractor: GeminiClient,
    store: LedgerStore,
    transcriber: Arc<dyn SpeechTranscriber>,
}

impl LedgerPipeline {
    pub fn new(
        extractor: GeminiClient,
        store: LedgerStore,
        transcriber: Arc<dyn SpeechTranscriber>,
    ) -> Self {
        Self {
            extractor,
            store,
            transcriber,
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Extract, normalize and persist one input for `tenant_id`.
    ///
    /// Only `InvalidInput` is returned as an error; upstream trouble has
    /// already been absorbed by the extractor's fallback.
    pub async fn record(
        &self,
        tenant_id: &str,
        text: Option<&str>,
        image: Option<&[u8]>,
        input_method: InputMethod,
    ) -> Result<PipelineOutcome, ExtractionError> {
        let extraction = self
            .extractor
            .analyze_financial_document(text, image)
            .await?;

        let mut transaction = normalize(&extraction.fields, input_method, tenant_id);
        if transaction.raw_text.is_empty() {
            if let Some(text) = text {
                transaction.raw_text = truncate_chars(text.trim(), RAW_TEXT_LIMIT);
            }
        }

        info!(
            user_id = %tenant_id,
            input_method = %input_method,
            from_model = extraction.source == ExtractionSource::Model,
            total_amount = transaction.total_amount,
            category = %transaction.category,
            "Input processed"
        );

        if input_method == InputMethod::Text && !transaction.has_amount() {
            info!(user_id = %tenant_id, "No amount found in text input, not saving");
            return Ok(PipelineOutcome::MissingAmount(transaction));
        }

        if self.store.save(&mut transaction).await {
            Ok(PipelineOutcome::Recorded(transaction))
        } else {
            warn!(user_id = %tenant_id, "Transaction extracted but not persisted");
            Ok(PipelineOutcome::NotPersisted(transaction))
        }
    }

    /// Transcribe a voice note through the injected transcriber
    pub async fn transcribe(&self, audio: &[u8]) -> anyhow::Result<String> {
        self.transcriber.transcribe(audio).await
    }

    /// Latest transactions for the statement view
    pub async fn recent(&self, tenant_id: &str) -> Vec<Transaction> {
        self.store.list_recent(tenant_id, STATEMENT_LIMIT).await
    }

    pub async fn summary(&self, tenant_id: &str) -> Option<LedgerSummary> {
        self.store.summarize(tenant_id).await
    }

    /// Clear one tenant, or everything with `None`
    pub async fn clear(&self, tenant_id: Option<&str>) -> bool {
        self.store.clear(tenant_id).await
    }
}
