//! Update handling shared by the webhook and polling transports.
//!
//! Every inbound update is routed to one of two independent branches:
//! document uploads from the source channel go to [`ingest`], plain text in a
//! private chat goes to [`lookup`]. Everything else is dropped without a reply.

pub mod ingest;
pub mod lookup;
pub mod redelivery;

use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;
use crate::ledger::{KeyStore, Ledger, LedgerEntry};
use crate::telegram::{ChatKind, Messenger, TelegramError, Update};

pub use redelivery::{DeliveryReport, Redelivery};

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Failed to send reply: {0}")]
    Reply(#[from] TelegramError),
}

/// What handling one update amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Ignored,
    Recorded(LedgerEntry),
    /// The upload was accepted but the ledger write failed
    RecordFailed,
    Greeted,
    KeyRejected,
    Delivered(DeliveryReport),
}

pub struct Dispatcher {
    source_channel: i64,
    archive_extension: String,
    primary_tab: String,
    support_contact: String,
    messenger: Arc<dyn Messenger>,
    ledger: Arc<dyn Ledger>,
    keys: Arc<KeyStore>,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        messenger: Arc<dyn Messenger>,
        ledger: Arc<dyn Ledger>,
        keys: Arc<KeyStore>,
    ) -> Self {
        Self {
            source_channel: config.bot.channel_id,
            archive_extension: config.bot.archive_extension.clone(),
            primary_tab: config.ledger.primary_tab().to_string(),
            support_contact: config.bot.support_contact.clone(),
            messenger,
            ledger,
            keys,
        }
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub async fn handle_update(&self, update: &Update) -> Result<UpdateOutcome, BotError> {
        let Some(message) = update.effective_message() else {
            return Ok(UpdateOutcome::Ignored);
        };

        if message.document.is_some() {
            let Some(entry) =
                ingest::archive_entry(message, self.source_channel, &self.archive_extension)
            else {
                return Ok(UpdateOutcome::Ignored);
            };
            return Ok(ingest::record(self.ledger.as_ref(), &self.primary_tab, entry).await);
        }

        match (message.text.as_deref(), message.chat.kind) {
            (Some(text), ChatKind::Private) => {
                let keys = self.keys.snapshot().await;
                let redelivery = Redelivery::new(
                    self.messenger.as_ref(),
                    self.source_channel,
                    &self.support_contact,
                );
                lookup::answer(&keys, &redelivery, message.chat.id, text).await
            }
            _ => Ok(UpdateOutcome::Ignored),
        }
    }
}
