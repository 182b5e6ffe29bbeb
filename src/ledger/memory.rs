use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ColumnLayout, Ledger, LedgerEntry, LedgerError};

/// In-memory ledger for development and testing.
#[derive(Default)]
pub struct MemoryLedger {
    tabs: Mutex<HashMap<String, Vec<Vec<String>>>>,
    unreachable: AtomicBool,
    reject_appends: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tab holding only the standard header row.
    pub fn with_tab(tab: &str) -> Self {
        let ledger = Self::new();
        ledger.insert_tab(
            tab,
            vec![vec![
                "key".to_string(),
                "name_file".to_string(),
                "message_id".to_string(),
            ]],
        );
        ledger
    }

    /// Replace a tab's contents. The first row is the header.
    pub fn insert_tab(&self, tab: &str, rows: Vec<Vec<String>>) {
        self.lock().insert(tab.to_string(), rows);
    }

    /// Current rows of a tab, header included.
    pub fn rows(&self, tab: &str) -> Vec<Vec<String>> {
        self.lock().get(tab).cloned().unwrap_or_default()
    }

    /// Make every call fail as if the service were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make appends fail while reads keep working.
    pub fn set_reject_appends(&self, reject: bool) {
        self.reject_appends.store(reject, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Vec<String>>>> {
        // A poisoned map is still structurally valid
        self.tabs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_reachable(&self) -> Result<(), LedgerError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("ledger unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn read_tab(&self, tab: &str) -> Result<Vec<Vec<String>>, LedgerError> {
        self.check_reachable()?;
        self.lock()
            .get(tab)
            .cloned()
            .ok_or_else(|| LedgerError::TabNotFound(tab.to_string()))
    }

    async fn append(&self, tab: &str, entry: &LedgerEntry) -> Result<(), LedgerError> {
        self.check_reachable()?;
        if self.reject_appends.load(Ordering::SeqCst) {
            return Err(LedgerError::Backend("append rejected".to_string()));
        }

        let mut tabs = self.lock();
        let rows = tabs
            .get_mut(tab)
            .ok_or_else(|| LedgerError::TabNotFound(tab.to_string()))?;
        let header = rows.first().map(Vec::as_slice).unwrap_or_default();
        let layout = ColumnLayout::from_header(tab, header)?;

        let mut row = vec![String::new(); layout.width()];
        row[layout.key] = entry.key.clone().unwrap_or_default();
        row[layout.file_name] = entry.file_name.clone();
        row[layout.message_id] = entry.message_id.to_string();
        rows.push(row);
        Ok(())
    }
}
