use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::{load_key_map, KeyMap, Ledger, LedgerError};

/// Holds the current key map snapshot.
///
/// Readers take a cheap `Arc` clone; a rebuild swaps the whole map at once.
pub struct KeyStore {
    current: RwLock<Arc<KeyMap>>,
}

impl KeyStore {
    pub fn new(map: KeyMap) -> Self {
        Self {
            current: RwLock::new(Arc::new(map)),
        }
    }

    pub async fn snapshot(&self) -> Arc<KeyMap> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn replace(&self, map: KeyMap) {
        *self.current.write().await = Arc::new(map);
    }

    /// Rebuild from the ledger. The previous snapshot stays in place on failure.
    pub async fn reload(&self, ledger: &dyn Ledger, tabs: &[String]) -> Result<usize, LedgerError> {
        let map = load_key_map(ledger, tabs).await?;
        let keys = map.len();
        self.replace(map).await;
        Ok(keys)
    }
}

/// Rebuild the key map on a fixed interval until the task is aborted.
pub fn spawn_refresher(
    store: Arc<KeyStore>,
    ledger: Arc<dyn Ledger>,
    tabs: Vec<String>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; startup already loaded the map
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.reload(ledger.as_ref(), &tabs).await {
                Ok(keys) => tracing::debug!(keys, "Refreshed key map"),
                Err(e) => {
                    tracing::warn!(error = %e, "Key map refresh failed, keeping previous snapshot")
                }
            }
        }
    })
}
