//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{FileId, ParseMode};
use tracing::{debug, error, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import pipeline types
use crate::errors::TransportError;
use crate::pipeline::{LedgerPipeline, PipelineOutcome};
use crate::transaction_model::InputMethod;

// Import dialogue types
use crate::dialogue::{ClearDialogue, ClearDialogueState, ClearScope};

use super::dialogue_manager::{handle_cancel, handle_clear_reply, handle_clear_request, ReplyHandling};
use super::ui_builder::{
    format_help, format_statement, format_summary, format_transaction_response, format_welcome,
};
use super::BotSettings;

/// Largest file the Bot API lets bots download
pub const TELEGRAM_DOWNLOAD_LIMIT: u64 = 20 * 1024 * 1024;

/// Words that only make sense as answers to the clear prompt
const CONFIRMATION_WORDS: &[&str] = &["SIM", "NÃO", "NAO", "CANCELAR"];

/// Bot commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Statement,
    Summary,
    Clear,
    ClearAll,
    Cancel,
    Unknown(String),
}

/// Parse a `/command` (optionally addressed as `/command@BotName`). `None` for plain text.
pub fn parse_command(text: &str) -> Option<Command> {
    let token = text.trim().split_whitespace().next()?;
    let name = token.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or_default().to_lowercase();

    let command = match name.as_str() {
        "start" => Command::Start,
        "ajuda" | "help" => Command::Help,
        "extrato" => Command::Statement,
        "resumo" => Command::Summary,
        "limpar" => Command::Clear,
        "limpar_tudo" => Command::ClearAll,
        "cancelar" => Command::Cancel,
        _ => Command::Unknown(name),
    };
    Some(command)
}

/// `true` for bare answers to the clear prompt received outside the dialogue
pub fn is_stray_confirmation(text: &str) -> bool {
    let upper = text.trim().to_uppercase();
    CONFIRMATION_WORDS.contains(&upper.as_str())
}

fn language_code(msg: &Message) -> Option<&str> {
    msg.from
        .as_ref()
        .and_then(|user| user.language_code.as_deref())
}

/// Send a plain reply. Delivery failures are logged, never retried.
pub async fn send_reply(bot: &Bot, chat_id: ChatId, text: impl Into<String>) {
    if let Err(e) = bot.send_message(chat_id, text).await {
        let e = TransportError::from(e);
        warn!(user_id = %chat_id, error = %e, "Failed to deliver reply");
    }
}

/// Send a legacy-Markdown reply. Delivery failures are logged, never retried.
#[allow(deprecated)]
pub async fn send_markdown(bot: &Bot, chat_id: ChatId, text: impl Into<String>) {
    if let Err(e) = bot
        .send_message(chat_id, text)
        .parse_mode(ParseMode::Markdown)
        .await
    {
        let e = TransportError::from(e);
        warn!(user_id = %chat_id, error = %e, "Failed to deliver reply");
    }
}

/// Download a Telegram file into memory through the bot's HTTP client
pub async fn download_file(bot: &Bot, file_id: FileId) -> Result<Vec<u8>, TransportError> {
    let file = bot.get_file(file_id).await?;
    if u64::from(file.size) > TELEGRAM_DOWNLOAD_LIMIT {
        return Err(TransportError::FileTooLarge(u64::from(file.size)));
    }

    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        bot.token(),
        file.path
    );

    let bytes = bot
        .client()
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    debug!(file_bytes = bytes.len(), "File downloaded");
    Ok(bytes.to_vec())
}

async fn download_or_report(
    bot: &Bot,
    chat_id: ChatId,
    file_id: FileId,
    language_code: Option<&str>,
) -> Option<Vec<u8>> {
    match download_file(bot, file_id).await {
        Ok(bytes) => Some(bytes),
        Err(TransportError::FileTooLarge(size)) => {
            warn!(user_id = %chat_id, file_bytes = size, "File exceeds download limit");
            let limit = (TELEGRAM_DOWNLOAD_LIMIT / (1024 * 1024)).to_string();
            send_reply(
                bot,
                chat_id,
                t_args_lang("error-file-too-large", &[("limit", limit.as_str())], language_code),
            )
            .await;
            None
        }
        Err(e) => {
            error!(user_id = %chat_id, error = %e, "Failed to download file");
            send_reply(bot, chat_id, t_lang("error-download", language_code)).await;
            None
        }
    }
}

/// Reply to a pipeline outcome
async fn report_outcome(
    bot: &Bot,
    chat_id: ChatId,
    outcome: PipelineOutcome,
    language_code: Option<&str>,
) {
    match outcome {
        PipelineOutcome::Recorded(transaction) => {
            send_markdown(
                bot,
                chat_id,
                format_transaction_response(&transaction, language_code),
            )
            .await;
        }
        PipelineOutcome::MissingAmount(_) => {
            send_reply(bot, chat_id, t_lang("missing-amount", language_code)).await;
        }
        PipelineOutcome::NotPersisted(_) => {
            send_reply(bot, chat_id, t_lang("error-save", language_code)).await;
        }
    }
}

async fn record_and_report(
    bot: &Bot,
    msg: &Message,
    pipeline: &LedgerPipeline,
    text: Option<&str>,
    image: Option<&[u8]>,
    input_method: InputMethod,
    failure_key: &str,
) {
    let language_code = language_code(msg);
    let tenant_id = msg.chat.id.to_string();

    match pipeline.record(&tenant_id, text, image, input_method).await {
        Ok(outcome) => report_outcome(bot, msg.chat.id, outcome, language_code).await,
        Err(e) => {
            error!(user_id = %msg.chat.id, error = %e, "Input could not be processed");
            send_reply(bot, msg.chat.id, t_lang(failure_key, language_code)).await;
        }
    }
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    command: Command,
    pipeline: &LedgerPipeline,
    settings: &BotSettings,
    dialogue: ClearDialogue,
) -> Result<()> {
    let language_code = language_code(msg);
    let chat_id = msg.chat.id;
    let tenant_id = chat_id.to_string();
    debug!(user_id = %chat_id, command = ?command, "Received command");

    match command {
        Command::Start => send_markdown(bot, chat_id, format_welcome(language_code)).await,
        Command::Help => send_markdown(bot, chat_id, format_help(language_code)).await,
        Command::Statement => {
            let transactions = pipeline.recent(&tenant_id).await;
            send_markdown(bot, chat_id, format_statement(&transactions, language_code)).await;
        }
        Command::Summary => {
            let summary = pipeline.summary(&tenant_id).await;
            send_markdown(bot, chat_id, format_summary(summary.as_ref(), language_code)).await;
        }
        Command::Clear => {
            handle_clear_request(bot, msg, dialogue, ClearScope::Tenant, language_code).await?;
        }
        Command::ClearAll => {
            if settings.is_admin(chat_id) {
                handle_clear_request(bot, msg, dialogue, ClearScope::All, language_code).await?;
            } else {
                warn!(user_id = %chat_id, "Full clear refused for non-admin chat");
                send_reply(bot, chat_id, t_lang("clear-not-allowed", language_code)).await;
            }
        }
        Command::Cancel => handle_cancel(bot, msg, dialogue, language_code).await?,
        Command::Unknown(name) => {
            debug!(user_id = %chat_id, command = %name, "Unknown command");
            send_reply(bot, chat_id, t_lang("unknown-command", language_code)).await;
        }
    }
    Ok(())
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    text: &str,
    pipeline: &LedgerPipeline,
    settings: &BotSettings,
    dialogue: ClearDialogue,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, message_length = text.len(), "Received text message from user");
    let language_code = language_code(msg);

    // Check dialogue state first
    if let Some(ClearDialogueState::AwaitingConfirmation {
        scope,
        requested_at,
    }) = dialogue.get().await?
    {
        let handling = handle_clear_reply(
            bot,
            msg,
            dialogue.clone(),
            pipeline,
            scope,
            requested_at,
            text,
            language_code,
        )
        .await?;
        if handling == ReplyHandling::Consumed {
            return Ok(());
        }
    }

    if let Some(command) = parse_command(text) {
        return handle_command(bot, msg, command, pipeline, settings, dialogue).await;
    }

    if is_stray_confirmation(text) {
        debug!(user_id = %msg.chat.id, "Ignoring confirmation word outside a clear dialogue");
        return Ok(());
    }

    send_reply(bot, msg.chat.id, t_lang("processing-text", language_code)).await;
    record_and_report(
        bot,
        msg,
        pipeline,
        Some(text),
        None,
        InputMethod::Text,
        "error-text",
    )
    .await;
    Ok(())
}

async fn handle_photo_message(bot: &Bot, msg: &Message, pipeline: &LedgerPipeline) -> Result<()> {
    let language_code = language_code(msg);
    debug!(user_id = %msg.chat.id, "Received photo message from user");

    let Some(largest_photo) = msg.photo().and_then(|photos| photos.last()) else {
        return Ok(());
    };

    send_reply(bot, msg.chat.id, t_lang("processing-photo", language_code)).await;

    let Some(image) =
        download_or_report(bot, msg.chat.id, largest_photo.file.id.clone(), language_code).await
    else {
        return Ok(());
    };

    info!(user_id = %msg.chat.id, image_bytes = image.len(), "Photo downloaded");
    record_and_report(
        bot,
        msg,
        pipeline,
        msg.caption(),
        Some(image.as_slice()),
        InputMethod::Image,
        "error-image",
    )
    .await;
    Ok(())
}

async fn handle_voice_message(bot: &Bot, msg: &Message, pipeline: &LedgerPipeline) -> Result<()> {
    let language_code = language_code(msg);
    debug!(user_id = %msg.chat.id, "Received voice message from user");

    let Some(voice) = msg.voice() else {
        return Ok(());
    };

    send_reply(bot, msg.chat.id, t_lang("processing-voice", language_code)).await;

    let Some(audio) =
        download_or_report(bot, msg.chat.id, voice.file.id.clone(), language_code).await
    else {
        return Ok(());
    };

    let transcript = match pipeline.transcribe(&audio).await {
        Ok(transcript) => transcript,
        Err(e) => {
            error!(user_id = %msg.chat.id, error = %e, "Transcription failed");
            send_reply(bot, msg.chat.id, t_lang("error-voice", language_code)).await;
            return Ok(());
        }
    };

    send_reply(
        bot,
        msg.chat.id,
        t_args_lang("voice-transcribed", &[("text", transcript.as_str())], language_code),
    )
    .await;

    record_and_report(
        bot,
        msg,
        pipeline,
        Some(transcript.as_str()),
        None,
        InputMethod::Voice,
        "error-voice",
    )
    .await;
    Ok(())
}

async fn handle_unsupported_message(bot: &Bot, msg: &Message) -> Result<()> {
    debug!(user_id = %msg.chat.id, "Received unsupported message type from user");
    send_reply(bot, msg.chat.id, t_lang("unsupported-message", language_code(msg))).await;
    Ok(())
}

async fn route_message(
    bot: &Bot,
    msg: &Message,
    pipeline: &LedgerPipeline,
    settings: &BotSettings,
    dialogue: ClearDialogue,
) -> Result<()> {
    if let Some(text) = msg.text() {
        handle_text_message(bot, msg, text, pipeline, settings, dialogue).await
    } else if msg.photo().is_some() {
        handle_photo_message(bot, msg, pipeline).await
    } else if msg.voice().is_some() {
        handle_voice_message(bot, msg, pipeline).await
    } else {
        handle_unsupported_message(bot, msg).await
    }
}

/// Entry point for every new or edited message
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    pipeline: Arc<LedgerPipeline>,
    settings: Arc<BotSettings>,
    dialogue: ClearDialogue,
) -> Result<()> {
    if let Err(e) = route_message(&bot, &msg, &pipeline, &settings, dialogue).await {
        error!(user_id = %msg.chat.id, error = %e, "Unhandled error while processing message");
        send_reply(&bot, msg.chat.id, t_lang("error-internal", language_code(&msg))).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_variants() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/ajuda"), Some(Command::Help));
        assert_eq!(parse_command("/extrato@FinTrackerBot"), Some(Command::Statement));
        assert_eq!(parse_command("  /RESUMO agora"), Some(Command::Summary));
        assert_eq!(parse_command("/limpar_tudo"), Some(Command::ClearAll));
        assert_eq!(
            parse_command("/foo"),
            Some(Command::Unknown("foo".to_string()))
        );
        assert_eq!(parse_command("gastei 10 reais"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_stray_confirmation_words() {
        assert!(is_stray_confirmation("sim"));
        assert!(is_stray_confirmation("Não"));
        assert!(is_stray_confirmation(" NAO "));
        assert!(is_stray_confirmation("cancelar"));
        assert!(!is_stray_confirmation("sim, gastei 10 reais"));
    }
}
