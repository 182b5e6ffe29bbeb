//! Telegram Bot API access.

mod client;
pub mod types;

pub use client::BotApi;
pub use types::{Chat, ChatKind, Document, Message, Update, User};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Bot API error {code}: {description}")]
    Api { code: i64, description: String },
}

/// Outbound messaging operations the bot handlers need.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;

    /// Copy a message into another chat and return the id of the copy.
    /// With `protect_content` set, recipients cannot forward or save it.
    async fn copy_message(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
        protect_content: bool,
    ) -> Result<i64, TelegramError>;
}
