//! Long-polling transport: pulls updates with `getUpdates` instead of receiving webhooks.

use std::future::Future;
use std::time::Duration;

use crate::bot::Dispatcher;
use crate::telegram::BotApi;

/// Seconds Telegram holds each `getUpdates` call open waiting for updates.
pub const POLL_TIMEOUT_SECS: u64 = 25;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Poll and dispatch updates until `shutdown` resolves.
///
/// Updates are handled one at a time, in the order Telegram delivers them.
/// An update is acknowledged (its offset advanced past) even when handling it
/// failed, so a poisoned update cannot stall the loop.
pub async fn run<F>(api: &BotApi, dispatcher: &Dispatcher, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut offset: Option<i64> = None;
    let mut backoff = INITIAL_BACKOFF;

    tracing::info!("Polling for updates");

    loop {
        let batch = tokio::select! {
            _ = &mut shutdown => break,
            batch = api.get_updates(offset, POLL_TIMEOUT_SECS) => batch,
        };

        let updates = match batch {
            Ok(updates) => {
                backoff = INITIAL_BACKOFF;
                updates
            }
            Err(e) => {
                tracing::warn!(error = %e, retry_in = ?backoff, "getUpdates failed");
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            match dispatcher.handle_update(&update).await {
                Ok(outcome) => {
                    tracing::debug!(
                        update_id = update.update_id,
                        outcome = ?outcome,
                        "Handled update"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        update_id = update.update_id,
                        error = %e,
                        "Failed to process update"
                    );
                }
            }
        }
    }

    tracing::info!("Polling stopped");
}
