//! Speech-to-text seam for voice notes.
//!
//! No speech engine is wired in yet; [`PlaceholderTranscriber`] stands in so
//! voice messages still flow through the pipeline end to end.

use async_trait::async_trait;
use tracing::debug;

/// Transcript returned by [`PlaceholderTranscriber`]
pub const PLACEHOLDER_TRANSCRIPT: &str = "Transcrição simulada do áudio";

/// Turns recorded audio into text
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> anyhow::Result<String>;
}

/// Returns a constant transcript for any audio
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderTranscriber;

#[async_trait]
impl SpeechTranscriber for PlaceholderTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> anyhow::Result<String> {
        debug!(audio_bytes = audio.len(), "Using placeholder transcription");
        Ok(PLACEHOLDER_TRANSCRIPT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_placeholder_ignores_audio() {
        let transcriber = PlaceholderTranscriber;
        assert_eq!(
            transcriber.transcribe(&[]).await.unwrap(),
            PLACEHOLDER_TRANSCRIPT
        );
        assert_eq!(
            transcriber.transcribe(&[0u8; 128]).await.unwrap(),
            PLACEHOLDER_TRANSCRIPT
        );
    }
}
