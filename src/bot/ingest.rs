//! Recording archive uploads from the source channel.

use crate::ledger::{Ledger, LedgerEntry};
use crate::telegram::Message;

use super::UpdateOutcome;

/// The ledger row for a message, if it is an archive upload from the source channel.
///
/// Anything else yields `None` and is dropped without a reply.
pub fn archive_entry(
    message: &Message,
    source_channel: i64,
    extension: &str,
) -> Option<LedgerEntry> {
    if message.chat.id != source_channel {
        return None;
    }

    let file_name = message
        .document
        .as_ref()?
        .file_name
        .as_deref()
        .filter(|name| !name.is_empty())?;

    if !has_extension(file_name, extension) {
        return None;
    }

    let key = message
        .caption
        .as_deref()
        .map(str::trim)
        .filter(|caption| !caption.is_empty())
        .map(str::to_string);

    Some(LedgerEntry {
        key,
        file_name: file_name.to_string(),
        message_id: message.message_id,
    })
}

/// Case-insensitive suffix match. `extension` is expected in lowercase.
pub fn has_extension(file_name: &str, extension: &str) -> bool {
    file_name.to_lowercase().ends_with(extension)
}

/// Append the entry to the ledger. Failures are logged, never retried.
pub async fn record(ledger: &dyn Ledger, tab: &str, entry: LedgerEntry) -> UpdateOutcome {
    match ledger.append(tab, &entry).await {
        Ok(()) => {
            tracing::info!(
                file_name = %entry.file_name,
                message_id = entry.message_id,
                keyed = entry.key.is_some(),
                "Recorded upload"
            );
            UpdateOutcome::Recorded(entry)
        }
        Err(e) => {
            tracing::error!(
                file_name = %entry.file_name,
                message_id = entry.message_id,
                error = %e,
                "Failed to record upload in ledger"
            );
            UpdateOutcome::RecordFailed
        }
    }
}
