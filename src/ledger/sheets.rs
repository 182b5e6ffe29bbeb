use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{ColumnLayout, Ledger, LedgerEntry, LedgerError};
use crate::config::SpreadsheetRef;
use crate::credentials::TokenProvider;

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Base URLs for the Google APIs the ledger talks to.
#[derive(Debug, Clone)]
pub struct SheetsEndpoints {
    pub sheets: String,
    pub drive: String,
}

impl Default for SheetsEndpoints {
    fn default() -> Self {
        Self {
            sheets: "https://sheets.googleapis.com".to_string(),
            drive: "https://www.googleapis.com".to_string(),
        }
    }
}

/// Google Sheets ledger backend.
pub struct SheetsLedger {
    client: Client,
    endpoints: SheetsEndpoints,
    tokens: Arc<dyn TokenProvider>,
    spreadsheet_id: String,
    /// Header layouts of tabs we have read or appended to, refreshed on every read
    layouts: RwLock<HashMap<String, ColumnLayout>>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
}

impl SheetsLedger {
    /// Resolve the spreadsheet and confirm it is reachable with the given credentials.
    pub async fn connect(
        client: Client,
        endpoints: SheetsEndpoints,
        tokens: Arc<dyn TokenProvider>,
        spreadsheet: &SpreadsheetRef,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            client,
            endpoints,
            tokens,
            spreadsheet_id: String::new(),
            layouts: RwLock::new(HashMap::new()),
        };

        ledger.spreadsheet_id = match spreadsheet {
            SpreadsheetRef::Id(id) => id.clone(),
            SpreadsheetRef::Name(name) => ledger.resolve_by_name(name).await?,
        };

        let title = ledger.spreadsheet_title().await?;
        tracing::info!(
            spreadsheet_id = %ledger.spreadsheet_id,
            title = %title,
            "Connected to ledger"
        );
        Ok(ledger)
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    async fn resolve_by_name(&self, name: &str) -> Result<String, LedgerError> {
        let query = format!(
            "name = '{}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false",
            name.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let mut url = self.url(&self.endpoints.drive, &["drive", "v3", "files"])?;
        url.query_pairs_mut()
            .append_pair("q", &query)
            .append_pair("fields", "files(id)")
            .append_pair("pageSize", "10");

        let resp = self.get(url).await?;
        let list: DriveFileList = read_json(resp).await?;

        match list.files.as_slice() {
            [] => Err(LedgerError::SpreadsheetNotFound(name.to_string())),
            [only] => Ok(only.id.clone()),
            [first, ..] => {
                tracing::warn!(
                    name = %name,
                    matches = list.files.len(),
                    "Several spreadsheets share this name, using the first"
                );
                Ok(first.id.clone())
            }
        }
    }

    async fn spreadsheet_title(&self) -> Result<String, LedgerError> {
        #[derive(Deserialize)]
        struct Properties {
            title: String,
        }
        #[derive(Deserialize)]
        struct Spreadsheet {
            properties: Properties,
        }

        let mut url = self.url(
            &self.endpoints.sheets,
            &["v4", "spreadsheets", &self.spreadsheet_id],
        )?;
        url.query_pairs_mut()
            .append_pair("fields", "properties.title");

        let resp = self.get(url).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(LedgerError::SpreadsheetNotFound(self.spreadsheet_id.clone()));
        }
        let sheet: Spreadsheet = read_json(resp).await?;
        Ok(sheet.properties.title)
    }

    async fn fetch_range(&self, tab: &str, range: &str) -> Result<Vec<Vec<String>>, LedgerError> {
        let mut url = self.url(
            &self.endpoints.sheets,
            &["v4", "spreadsheets", &self.spreadsheet_id, "values", range],
        )?;
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");

        let resp = self.get(url).await?;

        // Sheets answers 400 "Unable to parse range" for tabs that don't exist
        if resp.status() == StatusCode::BAD_REQUEST {
            let body = resp.text().await.unwrap_or_default();
            if body.contains("Unable to parse range") {
                return Err(LedgerError::TabNotFound(tab.to_string()));
            }
            return Err(LedgerError::Backend(format!(
                "Sheets read failed (400): {}",
                google_message(&body)
            )));
        }

        let range: ValueRange = read_json(resp).await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    async fn layout_for(&self, tab: &str) -> Result<ColumnLayout, LedgerError> {
        if let Some(layout) = self.layouts.read().await.get(tab) {
            return Ok(*layout);
        }

        let header_rows = self.fetch_range(tab, &format!("{}!1:1", quote_tab(tab))).await?;
        let header = header_rows.first().map(Vec::as_slice).unwrap_or_default();
        let layout = ColumnLayout::from_header(tab, header)?;

        self.layouts.write().await.insert(tab.to_string(), layout);
        Ok(layout)
    }

    /// Track the header seen by the latest read so that reordered columns are
    /// picked up by the next append.
    async fn remember_layout(&self, tab: &str, rows: &[Vec<String>]) {
        let header = rows.first().map(Vec::as_slice).unwrap_or_default();
        let mut layouts = self.layouts.write().await;
        match ColumnLayout::from_header(tab, header) {
            Ok(layout) => {
                layouts.insert(tab.to_string(), layout);
            }
            Err(_) => {
                layouts.remove(tab);
            }
        }
    }

    async fn forget_layout(&self, tab: &str) {
        self.layouts.write().await.remove(tab);
    }

    async fn append_row(
        &self,
        tab: &str,
        layout: ColumnLayout,
        entry: &LedgerEntry,
    ) -> Result<(), LedgerError> {
        let mut row = vec![serde_json::Value::String(String::new()); layout.width()];
        row[layout.key] = entry.key.clone().unwrap_or_default().into();
        row[layout.file_name] = entry.file_name.clone().into();
        row[layout.message_id] = entry.message_id.into();

        let range = quote_tab(tab);
        let mut url = self.url(
            &self.endpoints.sheets,
            &[
                "v4",
                "spreadsheets",
                &self.spreadsheet_id,
                "values",
                &format!("{range}:append"),
            ],
        )?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let token = self.tokens.token().await?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": [row],
            }))
            .send()
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;
        let resp = check_auth(resp).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Backend(format!(
                "Sheets append failed ({status}): {}",
                google_message(&body)
            )));
        }

        Ok(())
    }

    fn url(&self, base: &str, segments: &[&str]) -> Result<Url, LedgerError> {
        let mut url = Url::parse(base)
            .map_err(|e| LedgerError::Backend(format!("Invalid endpoint '{base}': {e}")))?;
        url.path_segments_mut()
            .map_err(|_| LedgerError::Backend(format!("Invalid endpoint '{base}'")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, LedgerError> {
        let token = self.tokens.token().await?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;
        check_auth(resp).await
    }
}

#[async_trait]
impl Ledger for SheetsLedger {
    async fn read_tab(&self, tab: &str) -> Result<Vec<Vec<String>>, LedgerError> {
        let rows = self.fetch_range(tab, &quote_tab(tab)).await?;
        self.remember_layout(tab, &rows).await;
        Ok(rows)
    }

    async fn append(&self, tab: &str, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let layout = self.layout_for(tab).await?;
        let result = self.append_row(tab, layout, entry).await;
        if result.is_err() {
            // The header may have changed under us; read it again next time
            self.forget_layout(tab).await;
        }
        result
    }
}

/// Quote a tab name for A1 notation: `My Tab` -> `'My Tab'`.
fn quote_tab(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                (f as i64).to_string()
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

async fn check_auth(resp: reqwest::Response) -> Result<reqwest::Response, LedgerError> {
    match resp.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(LedgerError::Auth(format!(
                "Google API denied access ({status}): {}",
                google_message(&body)
            )))
        }
        _ => Ok(resp),
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, LedgerError> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(LedgerError::Backend(format!(
            "Google API request failed ({status}): {}",
            google_message(&body)
        )));
    }
    resp.json()
        .await
        .map_err(|e| LedgerError::Backend(format!("Unexpected response body: {e}")))
}

fn google_message(body: &str) -> String {
    serde_json::from_str::<GoogleErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_tab() {
        assert_eq!(quote_tab("1"), "'1'");
        assert_eq!(quote_tab("Bob's files"), "'Bob''s files'");
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&json!("abc")), "abc");
        assert_eq!(cell_to_string(&json!(555)), "555");
        assert_eq!(cell_to_string(&json!(555.0)), "555");
        assert_eq!(cell_to_string(&json!(1.5)), "1.5");
        assert_eq!(cell_to_string(&json!(null)), "");
        assert_eq!(cell_to_string(&json!(true)), "true");
    }

    #[test]
    fn test_google_message() {
        let body = r#"{"error": {"code": 400, "message": "Unable to parse range: 'x'"}}"#;
        assert_eq!(google_message(body), "Unable to parse range: 'x'");
        assert_eq!(google_message("plain"), "plain");
    }
}
