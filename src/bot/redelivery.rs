//! Copying stored channel messages into a user's chat.

use serde::Serialize;

use crate::ledger::FileRecord;
use crate::telegram::Messenger;

/// Per-lookup delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Redelivery<'a> {
    messenger: &'a dyn Messenger,
    source_channel: i64,
    support_contact: &'a str,
}

impl<'a> Redelivery<'a> {
    pub fn new(
        messenger: &'a dyn Messenger,
        source_channel: i64,
        support_contact: &'a str,
    ) -> Self {
        Self {
            messenger,
            source_channel,
            support_contact,
        }
    }

    pub fn messenger(&self) -> &'a dyn Messenger {
        self.messenger
    }

    /// Copy every record, in order, into `chat_id` with forwarding disabled.
    ///
    /// A failed copy is counted and skipped; the remaining records are still
    /// attempted. When anything failed, the user gets a single warning at the end.
    ///
    /// Once copying has started nothing is reported as an error, so a caller
    /// never asks Telegram to resend an update whose files were already copied.
    pub async fn deliver(&self, chat_id: i64, records: &[FileRecord]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for record in records {
            match self
                .messenger
                .copy_message(chat_id, self.source_channel, record.message_id, true)
                .await
            {
                Ok(_) => {
                    report.delivered += 1;
                    // The file itself arrived; a lost confirmation is not a failed delivery
                    if let Err(e) = self
                        .messenger
                        .send_message(chat_id, &delivered_text(&record.file_name))
                        .await
                    {
                        tracing::warn!(chat_id, error = %e, "Failed to confirm delivery");
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        chat_id,
                        message_id = record.message_id,
                        file_name = %record.file_name,
                        error = %e,
                        "Failed to copy file"
                    );
                }
            }
        }

        if report.failed > 0 {
            if let Err(e) = self
                .messenger
                .send_message(chat_id, &failure_warning(report.failed, self.support_contact))
                .await
            {
                tracing::warn!(
                    chat_id,
                    failed = report.failed,
                    error = %e,
                    "Failed to send delivery warning"
                );
            }
        }

        tracing::info!(
            chat_id,
            delivered = report.delivered,
            failed = report.failed,
            "Redelivery finished"
        );
        report
    }
}

pub fn delivered_text(file_name: &str) -> String {
    format!("✅ Sent file: {file_name}")
}

pub fn failure_warning(errors: usize, support_contact: &str) -> String {
    let noun = if errors == 1 { "file" } else { "files" };
    format!("⚠️ {errors} {noun} could not be sent. Please contact {support_contact} for help.")
}
