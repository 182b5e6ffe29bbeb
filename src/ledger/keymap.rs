use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::LedgerError;

pub const KEY_COLUMN: &str = "key";
pub const FILE_NAME_COLUMN: &str = "name_file";
pub const MESSAGE_ID_COLUMN: &str = "message_id";

/// An archive previously posted to the source channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_name: String,
    /// Id of the channel message holding the file
    pub message_id: i64,
}

/// Trim and lowercase user input into a lookup key.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Positions of the required columns within a tab's header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub key: usize,
    pub file_name: usize,
    pub message_id: usize,
}

impl ColumnLayout {
    /// Locate the required columns by header name (trimmed, case-insensitive).
    pub fn from_header(tab: &str, header: &[String]) -> Result<Self, LedgerError> {
        let find = |name: &str| {
            header
                .iter()
                .position(|cell| cell.trim().eq_ignore_ascii_case(name))
        };

        match (
            find(KEY_COLUMN),
            find(FILE_NAME_COLUMN),
            find(MESSAGE_ID_COLUMN),
        ) {
            (Some(key), Some(file_name), Some(message_id)) => Ok(Self {
                key,
                file_name,
                message_id,
            }),
            (key, file_name, message_id) => {
                let columns = [
                    (key, KEY_COLUMN),
                    (file_name, FILE_NAME_COLUMN),
                    (message_id, MESSAGE_ID_COLUMN),
                ]
                .into_iter()
                .filter(|(pos, _)| pos.is_none())
                .map(|(_, name)| name)
                .collect();
                Err(LedgerError::MissingColumns {
                    tab: tab.to_string(),
                    columns,
                })
            }
        }
    }

    /// Number of cells a row needs to hold every required column.
    pub fn width(&self) -> usize {
        self.key.max(self.file_name).max(self.message_id) + 1
    }
}

/// Counts from scanning one tab.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TabStats {
    pub loaded: usize,
    pub skipped: usize,
}

/// In-memory index from normalized key to the files registered under it.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    entries: HashMap<String, Vec<FileRecord>>,
}

impl KeyMap {
    /// Records for a key, in ledger order. The input is normalized first.
    pub fn lookup(&self, raw_key: &str) -> Option<&[FileRecord]> {
        self.entries.get(&normalize_key(raw_key)).map(Vec::as_slice)
    }

    pub fn insert(&mut self, raw_key: &str, record: FileRecord) {
        self.entries
            .entry(normalize_key(raw_key))
            .or_default()
            .push(record);
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Add every valid data row of a tab. The first row must be the header.
    ///
    /// Nothing is inserted when the header lacks a required column.
    pub fn extend_from_tab(
        &mut self,
        tab: &str,
        rows: &[Vec<String>],
    ) -> Result<TabStats, LedgerError> {
        let header = rows.first().map(Vec::as_slice).unwrap_or_default();
        let layout = ColumnLayout::from_header(tab, header)?;
        let mut stats = TabStats::default();

        // Sheet rows are 1-based and the header occupies row 1
        for (row_number, row) in rows.iter().enumerate().skip(1).map(|(i, r)| (i + 1, r)) {
            match parse_row(&layout, row) {
                Some((key, record)) => {
                    self.insert(&key, record);
                    stats.loaded += 1;
                }
                None if row.iter().all(|cell| cell.trim().is_empty()) => {}
                None => {
                    tracing::warn!(tab = %tab, row = row_number, "Skipping incomplete ledger row");
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }
}

fn parse_row(layout: &ColumnLayout, row: &[String]) -> Option<(String, FileRecord)> {
    let cell = |idx: usize| row.get(idx).map(|c| c.trim()).filter(|c| !c.is_empty());

    let key = cell(layout.key)?;
    let file_name = cell(layout.file_name)?;
    let message_id = parse_message_id(cell(layout.message_id)?)?;

    Some((
        key.to_string(),
        FileRecord {
            file_name: file_name.to_string(),
            message_id,
        },
    ))
}

/// Sheets may hand integers back as `"555"` or `"555.0"`.
fn parse_message_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}
