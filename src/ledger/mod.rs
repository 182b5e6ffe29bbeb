//! The spreadsheet ledger: the system of record for key -> file associations.
//!
//! This crate only ever reads tabs and appends rows; it never updates or
//! deletes anything in the ledger.

mod keymap;
mod memory;
mod refresh;
mod sheets;

pub use keymap::{normalize_key, ColumnLayout, FileRecord, KeyMap, TabStats};
pub use memory::MemoryLedger;
pub use refresh::{spawn_refresher, KeyStore};
pub use sheets::{SheetsEndpoints, SheetsLedger};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Tab not found: {0}")]
    TabNotFound(String),
    #[error("Tab '{tab}' is missing required columns: {}", .columns.join(", "))]
    MissingColumns {
        tab: String,
        columns: Vec<&'static str>,
    },
    #[error("Spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

impl LedgerError {
    /// Whether the failure concerns a single tab rather than the service as a whole.
    pub fn is_tab_scoped(&self) -> bool {
        matches!(
            self,
            LedgerError::TabNotFound(_) | LedgerError::MissingColumns { .. }
        )
    }
}

impl From<crate::credentials::CredentialsError> for LedgerError {
    fn from(e: crate::credentials::CredentialsError) -> Self {
        LedgerError::Auth(e.to_string())
    }
}

/// A row to be appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Lookup key, when known at upload time. Left blank otherwise.
    pub key: Option<String>,
    pub file_name: String,
    pub message_id: i64,
}

/// Abstraction over the tabular store backing the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// All cell values of a tab, header row first. Trailing empty cells may be omitted.
    async fn read_tab(&self, tab: &str) -> Result<Vec<Vec<String>>, LedgerError>;
    /// Append one row to a tab, placing each value under its header column.
    async fn append(&self, tab: &str, entry: &LedgerEntry) -> Result<(), LedgerError>;
}

/// Build a fresh key map from every tab, in order.
///
/// Tabs that are absent or lack a required column are skipped with a warning.
/// Any other failure aborts the load.
pub async fn load_key_map(ledger: &dyn Ledger, tabs: &[String]) -> Result<KeyMap, LedgerError> {
    let mut map = KeyMap::default();

    for tab in tabs {
        let rows = match ledger.read_tab(tab).await {
            Ok(rows) => rows,
            Err(e) if e.is_tab_scoped() => {
                tracing::warn!(tab = %tab, error = %e, "Skipping ledger tab");
                continue;
            }
            Err(e) => return Err(e),
        };

        match map.extend_from_tab(tab, &rows) {
            Ok(stats) => {
                tracing::info!(
                    tab = %tab,
                    loaded = stats.loaded,
                    skipped = stats.skipped,
                    "Loaded ledger tab"
                );
            }
            Err(e) => {
                tracing::warn!(tab = %tab, error = %e, "Skipping ledger tab");
            }
        }
    }

    tracing::info!(keys = map.len(), records = map.record_count(), "Key map ready");
    Ok(map)
}
