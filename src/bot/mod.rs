//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Routes text, photo and voice messages and bot commands
//! - `dialogue_manager`: Drives the clear-confirmation dialogue
//! - `ui_builder`: Formats replies

pub mod dialogue_manager;
pub mod message_handler;
pub mod ui_builder;

use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

use crate::dialogue::ClearDialogueState;

// Re-export main handler functions for use in main.rs
pub use message_handler::message_handler;

// Re-export utility functions that might be used elsewhere
pub use message_handler::{download_file, parse_command, Command};
pub use ui_builder::{escape_markdown, format_statement, format_summary, format_transaction_response};

/// Settings the handlers need besides the pipeline
#[derive(Debug, Clone, Default)]
pub struct BotSettings {
    /// Chats allowed to run `/limpar_tudo`
    pub admin_chat_ids: Vec<i64>,
}

impl BotSettings {
    pub fn is_admin(&self, chat_id: ChatId) -> bool {
        self.admin_chat_ids.contains(&chat_id.0)
    }
}

/// Update routing: new and edited messages go through the same handler
pub fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, InMemStorage<ClearDialogueState>, ClearDialogueState>()
                .endpoint(message_handler),
        )
        .branch(
            Update::filter_edited_message()
                .enter_dialogue::<Message, InMemStorage<ClearDialogueState>, ClearDialogueState>()
                .endpoint(message_handler),
        )
}
