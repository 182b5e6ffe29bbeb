//! Shared test helpers: a recording messenger and a dispatcher wired to an in-memory ledger.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bot::Dispatcher;
use crate::config::Config;
use crate::ledger::{KeyMap, KeyStore, MemoryLedger};
use crate::telegram::{Chat, ChatKind, Document, Message, Messenger, TelegramError, Update};
use crate::AppState;

pub const CHANNEL_ID: i64 = -1001234567890;
pub const BOT_TOKEN: &str = "123456:TEST-TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCall {
    pub chat_id: i64,
    pub from_chat_id: i64,
    pub message_id: i64,
    pub protect_content: bool,
}

/// Messenger that records every call and fails on demand.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(i64, String)>>,
    copies: Mutex<Vec<CopyCall>>,
    failing_copies: HashSet<i64>,
    fail_sends: bool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `copy_message` for these source message ids.
    pub fn failing_copies(mut self, message_ids: &[i64]) -> Self {
        self.failing_copies.extend(message_ids);
        self
    }

    /// Fail every `send_message`.
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Every copy attempt, failed ones included.
    pub fn copies(&self) -> Vec<CopyCall> {
        self.copies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        if self.fail_sends {
            return Err(TelegramError::Api {
                code: 403,
                description: "Forbidden: bot was blocked by the user".to_string(),
            });
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn copy_message(
        &self,
        chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
        protect_content: bool,
    ) -> Result<i64, TelegramError> {
        self.copies.lock().unwrap().push(CopyCall {
            chat_id,
            from_chat_id,
            message_id,
            protect_content,
        });
        if self.failing_copies.contains(&message_id) {
            return Err(TelegramError::Api {
                code: 400,
                description: "Bad Request: message to copy not found".to_string(),
            });
        }
        Ok(message_id + 1000)
    }
}

pub fn test_config() -> Config {
    let channel = CHANNEL_ID.to_string();
    Config::from_lookup(|name| {
        match name {
            "BOT_TOKEN" => Some(BOT_TOKEN),
            "CHANNEL_ID" => Some(channel.as_str()),
            "GOOGLE_SHEET_JSON" => Some("{}"),
            "SHEET_ID" => Some("test-sheet"),
            "SHEET_TABS" => Some("1"),
            "SUPPORT_CONTACT" => Some("@support"),
            _ => None,
        }
        .map(str::to_string)
    })
    .expect("test config is valid")
}

pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub ledger: Arc<MemoryLedger>,
    pub messenger: Arc<RecordingMessenger>,
    pub state: Arc<AppState>,
}

/// Dispatcher over a ledger tab "1" seeded with `(key, file name, message id)` rows.
pub fn test_dispatcher(rows: &[(&str, &str, i64)]) -> Harness {
    harness_with(rows, RecordingMessenger::new())
}

pub fn harness_with(rows: &[(&str, &str, i64)], messenger: RecordingMessenger) -> Harness {
    let config = test_config();

    let mut tab = vec![vec![
        "key".to_string(),
        "name_file".to_string(),
        "message_id".to_string(),
    ]];
    tab.extend(
        rows.iter()
            .map(|(key, name, id)| vec![key.to_string(), name.to_string(), id.to_string()]),
    );

    let mut keys = KeyMap::default();
    keys.extend_from_tab("1", &tab).expect("valid test tab");

    let ledger = Arc::new(MemoryLedger::new());
    ledger.insert_tab("1", tab);
    let messenger = Arc::new(messenger);
    let keys = Arc::new(KeyStore::new(keys));

    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        messenger.clone(),
        ledger.clone(),
        keys,
    ));

    let state = Arc::new(AppState {
        config,
        dispatcher: Arc::clone(&dispatcher),
    });

    Harness {
        dispatcher,
        ledger,
        messenger,
        state,
    }
}

pub fn channel_document(
    chat_id: i64,
    message_id: i64,
    file_name: &str,
    caption: Option<&str>,
) -> Update {
    Update {
        update_id: message_id,
        message: None,
        channel_post: Some(Message {
            message_id,
            chat: Chat {
                id: chat_id,
                kind: ChatKind::Channel,
                title: Some("Archives".to_string()),
                username: None,
            },
            date: 1_700_000_000,
            from: None,
            text: None,
            caption: caption.map(str::to_string),
            document: Some(Document {
                file_id: format!("file-{message_id}"),
                file_unique_id: None,
                file_name: Some(file_name.to_string()),
                mime_type: Some("application/vnd.rar".to_string()),
                file_size: Some(1024),
            }),
        }),
    }
}

pub fn private_text(chat_id: i64, text: &str) -> Update {
    Update {
        update_id: 1,
        message: Some(Message {
            message_id: 1,
            chat: Chat {
                id: chat_id,
                kind: ChatKind::Private,
                title: None,
                username: None,
            },
            date: 1_700_000_000,
            from: None,
            text: Some(text.to_string()),
            caption: None,
            document: None,
        }),
        channel_post: None,
    }
}
