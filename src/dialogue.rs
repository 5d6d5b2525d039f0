//! Clear-confirmation dialogue for handling conversation state with users.
//!
//! `/limpar` (or `/limpar_tudo` for admins) moves the chat into
//! `AwaitingConfirmation`; the next text message resolves it exactly once.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

/// How long a confirmation prompt stays answerable
pub const CONFIRMATION_WINDOW_SECS: i64 = 120;

/// What a confirmed clear removes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearScope {
    /// Only the requesting chat's data
    Tenant,
    /// Every chat's data
    All,
}

/// Represents the conversation state for the clear dialogue
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ClearDialogueState {
    #[default]
    Done,
    AwaitingConfirmation {
        scope: ClearScope,
        requested_at: DateTime<Utc>,
    },
}

/// Type alias for our clear dialogue
pub type ClearDialogue = Dialogue<ClearDialogueState, InMemStorage<ClearDialogueState>>;

/// How a reply to the confirmation prompt resolves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearDecision {
    Confirm(ClearScope),
    Cancel,
    /// The prompt is stale; treat the reply as a normal message
    Expired,
}

/// `true` for the words that confirm a clear
pub fn is_confirmation(text: &str) -> bool {
    matches!(text.trim().to_uppercase().as_str(), "SIM" | "YES")
}

/// Resolve a reply given while awaiting confirmation
pub fn resolve_reply(
    scope: ClearScope,
    requested_at: DateTime<Utc>,
    reply: &str,
    now: DateTime<Utc>,
) -> ClearDecision {
    if now - requested_at > Duration::seconds(CONFIRMATION_WINDOW_SECS) {
        return ClearDecision::Expired;
    }
    if is_confirmation(reply) {
        ClearDecision::Confirm(scope)
    } else {
        ClearDecision::Cancel
    }
}
