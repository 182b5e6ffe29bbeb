//! archive-relay - Telegram bot that indexes archive uploads and redelivers them by key
//!
//! This crate provides:
//! - Ingestion of archive uploads from a source channel into a Google Sheets ledger
//! - Key lookup from private chats, redelivering matching files with forwarding disabled
//! - Webhook (axum) and long-polling transports sharing one update dispatcher

pub mod api;
pub mod bot;
pub mod config;
pub mod credentials;
pub mod ledger;
pub mod polling;
pub mod telegram;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use bot::Dispatcher;
use config::Config;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub dispatcher: Arc<Dispatcher>,
}
