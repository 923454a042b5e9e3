// src/storage/sheets.rs
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

use crate::storage::Table;
use crate::utils::error::StorageError;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4";
const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
// Headroom below the data, matching what the sheets were sized with by hand.
const SPARE_ROWS: usize = 10;

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
}

#[derive(Debug, Deserialize)]
struct SheetList {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

/// Minimal Google Sheets client: find-or-create a spreadsheet by title and
/// fully replace one tab. Authenticates with an externally obtained bearer token.
pub struct SheetsClient {
    http: reqwest::Client,
    token: String,
    sheets_base: String,
    drive_base: String,
}

impl SheetsClient {
    pub fn new(token: impl Into<String>) -> Result<Self, StorageError> {
        Self::with_base_urls(token, SHEETS_API, DRIVE_API)
    }

    /// Points the client at alternate API roots (used by tests).
    pub fn with_base_urls(
        token: impl Into<String>,
        sheets_base: &str,
        drive_base: &str,
    ) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            token: token.into(),
            sheets_base: sheets_base.to_string(),
            drive_base: drive_base.to_string(),
        })
    }

    /// Replaces the contents of `tab` in `spreadsheet` with `table`, creating
    /// either one if missing. An empty table leaves the destination untouched.
    ///
    /// The tab edits go out as one `batchUpdate`, which Sheets applies whole
    /// or not at all, so a failed upload never leaves a half-written tab.
    pub async fn replace_tab(&self, spreadsheet: &str, tab: &str, table: &Table) -> Result<(), StorageError> {
        if table.is_empty() {
            tracing::warn!("No rows for {} -> {}; leaving sheet untouched", spreadsheet, tab);
            return Ok(());
        }

        let spreadsheet_id = match self.find_spreadsheet(spreadsheet).await? {
            Some(id) => {
                tracing::info!("Connected to spreadsheet: {}", spreadsheet);
                id
            }
            None => {
                tracing::info!("Spreadsheet '{}' not found; creating it", spreadsheet);
                self.create_spreadsheet(spreadsheet).await?
            }
        };

        let rows = table.rows.len() + 1 + SPARE_ROWS;
        let cols = table.headers.len().max(1);
        let tabs = self.list_tabs(&spreadsheet_id).await?;

        let requests = match tabs.iter().find(|p| p.title == tab) {
            Some(existing) => {
                tracing::info!("Connected to worksheet: {}", tab);
                vec![
                    resize_request(existing.sheet_id, rows, cols),
                    clear_request(existing.sheet_id),
                    write_request(existing.sheet_id, table),
                ]
            }
            None => {
                let sheet_id = tabs.iter().map(|p| p.sheet_id).max().map_or(0, |id| id + 1);
                tracing::warn!("Worksheet '{}' not found; creating it ({}x{})", tab, rows, cols);
                vec![
                    add_request(sheet_id, tab, rows, cols),
                    write_request(sheet_id, table),
                ]
            }
        };

        self.batch_update(&spreadsheet_id, json!({ "requests": requests })).await?;
        tracing::info!("Upload complete: {} -> {} ({} rows)", spreadsheet, tab, table.rows.len());
        Ok(())
    }

    async fn find_spreadsheet(&self, title: &str) -> Result<Option<String>, StorageError> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query_literal(title),
            SPREADSHEET_MIME
        );
        let url = endpoint(&self.drive_base, &["files"])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await?;
        let list: DriveFileList = check(response).await?.json().await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_spreadsheet(&self, title: &str) -> Result<String, StorageError> {
        let url = endpoint(&self.sheets_base, &["spreadsheets"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "properties": { "title": title } }))
            .send()
            .await?;
        let created: CreatedSpreadsheet = check(response).await?.json().await?;
        Ok(created.spreadsheet_id)
    }

    async fn list_tabs(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>, StorageError> {
        let url = endpoint(&self.sheets_base, &["spreadsheets", spreadsheet_id])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("fields", "sheets.properties")])
            .send()
            .await?;
        let list: SheetList = check(response).await?.json().await?;
        Ok(list.sheets.into_iter().map(|s| s.properties).collect())
    }

    async fn batch_update(&self, spreadsheet_id: &str, body: serde_json::Value) -> Result<(), StorageError> {
        let segment = format!("{}:batchUpdate", spreadsheet_id);
        let url = endpoint(&self.sheets_base, &["spreadsheets", segment.as_str()])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

fn add_request(sheet_id: i64, tab: &str, rows: usize, cols: usize) -> serde_json::Value {
    json!({
        "addSheet": {
            "properties": {
                "sheetId": sheet_id,
                "title": tab,
                "gridProperties": { "rowCount": rows, "columnCount": cols }
            }
        }
    })
}

fn resize_request(sheet_id: i64, rows: usize, cols: usize) -> serde_json::Value {
    json!({
        "updateSheetProperties": {
            "properties": {
                "sheetId": sheet_id,
                "gridProperties": { "rowCount": rows, "columnCount": cols }
            },
            "fields": "gridProperties(rowCount,columnCount)"
        }
    })
}

/// A range without `rows` resets `fields` across the whole grid.
fn clear_request(sheet_id: i64) -> serde_json::Value {
    json!({
        "updateCells": {
            "range": { "sheetId": sheet_id },
            "fields": "userEnteredValue"
        }
    })
}

/// Header row then data from A1. Cells go in as plain strings, so nothing is
/// reinterpreted as a number or formula.
fn write_request(sheet_id: i64, table: &Table) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = std::iter::once(&table.headers)
        .chain(table.rows.iter())
        .map(|row| {
            let values: Vec<serde_json::Value> = row
                .iter()
                .map(|cell| json!({ "userEnteredValue": { "stringValue": cell } }))
                .collect();
            json!({ "values": values })
        })
        .collect();

    json!({
        "updateCells": {
            "start": { "sheetId": sheet_id, "rowIndex": 0, "columnIndex": 0 },
            "rows": rows,
            "fields": "userEnteredValue"
        }
    })
}

/// Joins percent-encoded path segments onto an API root.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, StorageError> {
    let mut url = Url::parse(base)
        .map_err(|e| StorageError::SheetsParse(format!("invalid API base {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| StorageError::SheetsParse(format!("API base cannot take a path: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!("Sheets API error {}: {}", status, body);
    Err(StorageError::SheetsApi { status, body })
}
