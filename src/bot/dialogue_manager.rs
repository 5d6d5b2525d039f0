//! Dialogue Manager module for the clear-confirmation flow

use anyhow::Result;
use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use tracing::{info, warn};

// Import localization
use crate::localization::t_lang;

// Import dialogue types
use crate::dialogue::{resolve_reply, ClearDecision, ClearDialogue, ClearDialogueState, ClearScope};
use crate::pipeline::LedgerPipeline;

use super::message_handler::{send_markdown, send_reply};
use super::ui_builder::format_clear_prompt;

/// Whether a reply was used up by the dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyHandling {
    Consumed,
    /// The prompt had expired; the message should be processed normally
    PassThrough,
}

/// Ask for confirmation and wait for the next text message
pub async fn handle_clear_request(
    bot: &Bot,
    msg: &Message,
    dialogue: ClearDialogue,
    scope: ClearScope,
    language_code: Option<&str>,
) -> Result<()> {
    info!(user_id = %msg.chat.id, scope = ?scope, "Clear requested");

    dialogue
        .update(ClearDialogueState::AwaitingConfirmation {
            scope,
            requested_at: Utc::now(),
        })
        .await?;

    send_markdown(bot, msg.chat.id, format_clear_prompt(scope, language_code)).await;
    Ok(())
}

/// Resolve the reply to a pending confirmation prompt
#[allow(clippy::too_many_arguments)]
pub async fn handle_clear_reply(
    bot: &Bot,
    msg: &Message,
    dialogue: ClearDialogue,
    pipeline: &LedgerPipeline,
    scope: ClearScope,
    requested_at: DateTime<Utc>,
    reply: &str,
    language_code: Option<&str>,
) -> Result<ReplyHandling> {
    // The prompt is single-shot whatever the answer
    dialogue.exit().await?;

    match resolve_reply(scope, requested_at, reply, Utc::now()) {
        ClearDecision::Confirm(scope) => {
            let tenant_id = msg.chat.id.to_string();
            let target = match scope {
                ClearScope::Tenant => Some(tenant_id.as_str()),
                ClearScope::All => None,
            };

            if pipeline.clear(target).await {
                info!(user_id = %msg.chat.id, scope = ?scope, "Clear confirmed and completed");
                send_reply(bot, msg.chat.id, t_lang("clear-success", language_code)).await;
            } else {
                send_reply(bot, msg.chat.id, t_lang("clear-failed", language_code)).await;
            }
            Ok(ReplyHandling::Consumed)
        }
        ClearDecision::Cancel => {
            info!(user_id = %msg.chat.id, "Clear cancelled");
            send_reply(bot, msg.chat.id, t_lang("clear-cancelled", language_code)).await;
            Ok(ReplyHandling::Consumed)
        }
        ClearDecision::Expired => {
            warn!(user_id = %msg.chat.id, "Clear confirmation expired");
            send_reply(bot, msg.chat.id, t_lang("clear-expired", language_code)).await;
            Ok(ReplyHandling::PassThrough)
        }
    }
}

/// `/cancelar` outside a pending prompt
pub async fn handle_cancel(
    bot: &Bot,
    msg: &Message,
    dialogue: ClearDialogue,
    language_code: Option<&str>,
) -> Result<()> {
    let pending = matches!(
        dialogue.get().await?,
        Some(ClearDialogueState::AwaitingConfirmation { .. })
    );
    dialogue.exit().await?;

    let key = if pending {
        "clear-cancelled"
    } else {
        "nothing-to-cancel"
    };
    send_reply(bot, msg.chat.id, t_lang(key, language_code)).await;
    Ok(())
}
