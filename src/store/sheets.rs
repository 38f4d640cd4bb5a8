//! Google Sheets backend (values API v4).
//!
//! The worksheet's first row is the header; every following row is one
//! service order. Cells are read with `UNFORMATTED_VALUE` so numbers and
//! booleans keep their JSON type. A full rewrite writes header + rows from
//! `A1` and then blanks any leftover rows below; a single-order save rewrites
//! only that order's row, or appends when the order is new.

use reqwest::blocking::Client;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::OrderStore;
use crate::error::StoreError;
use crate::records::{row_order_id, value_text, RawRecord, COLUMNS, COL_ORDER_ID};

const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub worksheet: String,
    pub api_base: String,
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>, worksheet: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

pub type TokenSource = Box<dyn Fn() -> Option<Zeroizing<String>> + Send + Sync>;

pub struct SheetsStore {
    config: SheetsConfig,
    client: Client,
    token: TokenSource,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsStore {
    /// `token` is asked for a bearer token on every request so an external
    /// refresher can rotate it in the credential store.
    pub fn new(config: SheetsConfig, token: TokenSource) -> Result<Self, StoreError> {
        if config.spreadsheet_id.trim().is_empty() {
            return Err(StoreError::Config("spreadsheet_id is empty".into()));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            token,
        })
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, StoreError> {
        let base = self.config.api_base.trim_end_matches('/');
        let mut url = Url::parse(base)
            .map_err(|e| StoreError::Config(format!("Invalid sheets API base {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Config(format!("Invalid sheets API base {base}")))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.config.spreadsheet_id.trim(), "values"])
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }

    fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, StoreError> {
        let token = (self.token)()
            .ok_or_else(|| StoreError::Config("no Google Sheets access token configured".into()))?;
        let shown = url.to_string();
        let mut req = self
            .client
            .request(method, url)
            .query(query)
            .bearer_auth(token.as_str());
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().map_err(|e| friendly_error(&shown, &e))?;
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| status_error(status));
            return Err(StoreError::Http(format!("{message} (HTTP {})", status.as_u16())));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| StoreError::Decode(format!("Invalid JSON from Sheets API: {e}")))
    }

    fn fetch_grid(&self) -> Result<Vec<Vec<Value>>, StoreError> {
        let range = sheet_range(&self.config.worksheet);
        let url = self.values_url(&range, "")?;
        let body = self.send(
            Method::GET,
            url,
            &[
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("majorDimension", "ROWS"),
            ],
            None,
        )?;
        let parsed: ValueRange = serde_json::from_value(body)
            .map_err(|e| StoreError::Decode(format!("Unexpected Sheets payload: {e}")))?;
        Ok(parsed.values)
    }

    fn put_range(&self, range: &str, values: Vec<Vec<Value>>) -> Result<(), StoreError> {
        let url = self.values_url(range, "")?;
        self.send(
            Method::PUT,
            url,
            &[("valueInputOption", "RAW")],
            Some(json!({ "range": range, "majorDimension": "ROWS", "values": values })),
        )?;
        Ok(())
    }

    /// Lay out header + rows from `A1` over the current `grid`, then blank
    /// whatever the old table had below the new last row. The write goes
    /// first, so a failed request never leaves the sheet empty.
    fn rewrite(&self, grid: &[Vec<Value>], rows: &[RawRecord]) -> Result<(), StoreError> {
        let (existing_header, _) = rows_from_grid(grid);
        let header = header_for(&existing_header, rows);
        let range = sheet_range(&self.config.worksheet);

        let mut values = Vec::with_capacity(rows.len() + 1);
        values.push(header.iter().map(|h| Value::from(h.as_str())).collect());
        values.extend(rows.iter().map(|r| row_cells(&header, r)));
        self.put_range(&format!("{range}!A1"), values)?;

        if let Some(stale) = stale_range(grid, header.len(), rows.len() + 1) {
            let clear_url = self.values_url(&format!("{range}!{stale}"), ":clear")?;
            self.send(Method::POST, clear_url, &[], Some(json!({})))?;
        }
        info!(rows = rows.len(), "rewrote service order sheet");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Grid <-> rows
// ---------------------------------------------------------------------------

fn sheet_range(worksheet: &str) -> String {
    let escaped = worksheet.replace('\'', "''");
    format!("'{escaped}'")
}

/// A1 column letters: 0 → A, 25 → Z, 26 → AA.
pub(crate) fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Split a value grid into its header and keyed rows. Fully blank rows are
/// dropped; short rows are padded with nulls.
pub(crate) fn rows_from_grid(grid: &[Vec<Value>]) -> (Vec<String>, Vec<RawRecord>) {
    let Some((head, body)) = grid.split_first() else {
        return (Vec::new(), Vec::new());
    };
    let header: Vec<String> = head.iter().map(value_text).collect();
    let rows = body
        .iter()
        .filter(|cells| cells.iter().any(|c| !value_text(c).is_empty()))
        .map(|cells| {
            header
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.is_empty())
                .map(|(i, name)| (name.clone(), cells.get(i).cloned().unwrap_or(Value::Null)))
                .collect::<RawRecord>()
        })
        .collect();
    (header, rows)
}

/// A1 range covering the rows of `grid` past `written` sheet rows, as wide
/// as the wider of the old grid and the new header. `None` when the new
/// table is at least as tall as the old one.
pub(crate) fn stale_range(grid: &[Vec<Value>], header_len: usize, written: usize) -> Option<String> {
    if grid.len() <= written {
        return None;
    }
    let width = grid
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(header_len))
        .max()
        .unwrap_or(1)
        .max(1);
    let last = column_letter(width - 1);
    Some(format!("A{}:{last}{}", written + 1, grid.len()))
}

/// Header for a full rewrite: canonical columns, then any extra columns the
/// sheet already had so hand-added columns survive.
pub(crate) fn header_for(existing: &[String], rows: &[RawRecord]) -> Vec<String> {
    let mut header: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
    let extras = existing
        .iter()
        .cloned()
        .chain(rows.iter().flat_map(|r| r.keys().cloned()));
    for name in extras {
        if !name.is_empty() && !header.contains(&name) {
            header.push(name);
        }
    }
    header
}

pub(crate) fn row_cells(header: &[String], row: &RawRecord) -> Vec<Value> {
    header
        .iter()
        .map(|name| match row.get(name) {
            Some(Value::Null) | None => Value::from(""),
            Some(v) => v.clone(),
        })
        .collect()
}

fn friendly_error(url: &str, err: &reqwest::Error) -> StoreError {
    let message = if err.is_connect() {
        format!("Cannot reach Google Sheets at {url}")
    } else if err.is_timeout() {
        format!("Connection to {url} timed out")
    } else if err.is_builder() {
        format!("Invalid Google Sheets URL: {url}")
    } else {
        format!("Network error communicating with {url}: {err}")
    };
    StoreError::Http(message)
}

fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Google access token is invalid or expired".to_string(),
        403 => "Service account has no access to the spreadsheet".to_string(),
        404 => "Spreadsheet or worksheet not found".to_string(),
        429 => "Google Sheets quota exceeded".to_string(),
        s if s >= 500 => format!("Google Sheets server error (HTTP {s})"),
        s => format!("Unexpected response from Google Sheets (HTTP {s})"),
    }
}

impl OrderStore for SheetsStore {
    fn backend_name(&self) -> &'static str {
        "google-sheets"
    }

    fn read_all(&self) -> Result<Vec<RawRecord>, StoreError> {
        let grid = self.fetch_grid()?;
        let (_, rows) = rows_from_grid(&grid);
        debug!(rows = rows.len(), "read service orders from sheet");
        Ok(rows)
    }

    fn write_all(&self, rows: &[RawRecord]) -> Result<(), StoreError> {
        let grid = self.fetch_grid()?;
        self.rewrite(&grid, rows)
    }

    fn upsert(&self, row: &RawRecord) -> Result<(), StoreError> {
        let grid = self.fetch_grid()?;
        let (header, rows) = rows_from_grid(&grid);
        if !header.iter().any(|h| h == COL_ORDER_ID) {
            // Empty or header-less sheet: lay it out from scratch.
            let mut all = rows;
            super::replace_or_push(&mut all, row);
            return self.rewrite(&grid, &all);
        }

        let id = row_order_id(row);
        let id_col = header.iter().position(|h| h == COL_ORDER_ID).unwrap_or(0);
        // Grid row index, counting blank rows so the A1 address is exact.
        let position = grid
            .iter()
            .skip(1)
            .position(|cells| cells.get(id_col).map(value_text).as_deref() == Some(id.as_str()));

        let missing_column = row.keys().any(|k| !header.contains(k));
        if missing_column {
            let mut all = rows;
            super::replace_or_push(&mut all, row);
            return self.rewrite(&grid, &all);
        }

        let range = sheet_range(&self.config.worksheet);
        let cells = row_cells(&header, row);
        match position {
            Some(offset) => {
                let sheet_row = offset + 2;
                let last = column_letter(header.len().saturating_sub(1));
                self.put_range(&format!("{range}!A{sheet_row}:{last}{sheet_row}"), vec![cells])?;
                debug!(order_id = %id, sheet_row, "updated sheet row");
            }
            None => {
                let url = self.values_url(&range, ":append")?;
                self.send(
                    Method::POST,
                    url,
                    &[
                        ("valueInputOption", "RAW"),
                        ("insertDataOption", "INSERT_ROWS"),
                    ],
                    Some(json!({ "majorDimension": "ROWS", "values": [cells] })),
                )?;
                debug!(order_id = %id, "appended sheet row");
            }
        }
        Ok(())
    }
}
