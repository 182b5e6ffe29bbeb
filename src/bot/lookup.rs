//! Answering key lookups from private chats.

use crate::ledger::{normalize_key, KeyMap};

use super::{BotError, Redelivery, UpdateOutcome};

pub const KEY_INCORRECT: &str = "❌ Key incorrect. Please check your key and try again.";
pub const GREETING: &str = "👋 Send me your key and I will send you the matching files.";

/// Handle one text message: greet on `/start` or `/help`, otherwise treat the
/// text as a key and redeliver every file registered under it.
pub async fn answer(
    keys: &KeyMap,
    redelivery: &Redelivery<'_>,
    chat_id: i64,
    text: &str,
) -> Result<UpdateOutcome, BotError> {
    let key = normalize_key(text);

    if is_greeting_command(&key) {
        redelivery.messenger().send_message(chat_id, GREETING).await?;
        return Ok(UpdateOutcome::Greeted);
    }

    let Some(records) = keys.lookup(&key) else {
        tracing::debug!(chat_id, "Rejected unknown key");
        redelivery
            .messenger()
            .send_message(chat_id, KEY_INCORRECT)
            .await?;
        return Ok(UpdateOutcome::KeyRejected);
    };

    let report = redelivery.deliver(chat_id, records).await;
    Ok(UpdateOutcome::Delivered(report))
}

/// Matches `/start` and `/help`, including the `@botname` suffix form.
fn is_greeting_command(key: &str) -> bool {
    let command = key.split('@').next().unwrap_or_default();
    matches!(command, "/start" | "/help")
}
