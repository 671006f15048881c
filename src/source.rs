//! The external spreadsheet source.
//!
//! [`SheetSource`] is the seam between the cache and the outside world:
//! production uses [`GoogleSheetSource`] against the Sheets API v4 values
//! endpoint; tests plug in an in-process implementation.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;

use crate::config::SourceConfig;
use crate::models::{Record, SheetData};

/// Fetches one sheet tab as a raw rectangular dataset.
///
/// Implementations fail with a source-unavailable error on auth, network,
/// or quota problems; the cache decides whether a stale entry can stand in.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch(&self, sheet_id: &str, tab: &str) -> Result<SheetData>;
}

/// Google Sheets API v4 client (`GET /v4/spreadsheets/{id}/values/{tab}`),
/// authenticated with an API key. The base URL is configurable so tests can
/// point at a local server.
pub struct GoogleSheetSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleSheetSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

/// Response shape of the values endpoint. Cells may arrive as numbers or
/// booleans; everything is carried as JSON values and stringified during
/// normalization.
#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[async_trait]
impl SheetSource for GoogleSheetSource {
    async fn fetch(&self, sheet_id: &str, tab: &str) -> Result<SheetData> {
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url, sheet_id, tab
        );

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("Failed to reach sheet source for '{}'", sheet_id))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "Sheet source returned {} for '{}/{}': {}",
                status,
                sheet_id,
                tab,
                body
            );
        }

        let range: ValueRange = response
            .json()
            .await
            .with_context(|| format!("Failed to decode sheet response for '{}'", sheet_id))?;

        Ok(normalize_values(range.values))
    }
}

/// Normalizes the raw values rectangle: the first row is the header, every
/// data row is padded with empty strings up to the header width, and cells
/// beyond it are dropped.
pub fn normalize_values(values: Vec<Vec<serde_json::Value>>) -> SheetData {
    let mut rows = values.into_iter();

    let columns: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|cell| cell_to_string(&cell))
        .collect();

    let records: Vec<Record> = rows
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let value = row.get(i).map(cell_to_string).unwrap_or_default();
                    (column.clone(), value)
                })
                .collect::<IndexMap<_, _>>()
        })
        .collect();

    SheetData { records, columns }
}

fn cell_to_string(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_pads_short_rows() {
        let data = normalize_values(vec![
            vec![json!("name"), json!("city"), json!("age")],
            vec![json!("Alice"), json!("Berlin")],
        ]);
        assert_eq!(data.columns, vec!["name", "city", "age"]);
        assert_eq!(data.records[0]["age"], "");
    }

    #[test]
    fn test_normalize_truncates_wide_rows() {
        let data = normalize_values(vec![
            vec![json!("name")],
            vec![json!("Alice"), json!("extra")],
        ]);
        assert_eq!(data.records[0].len(), 1);
        assert_eq!(data.records[0]["name"], "Alice");
    }

    #[test]
    fn test_normalize_stringifies_non_string_cells() {
        let data = normalize_values(vec![
            vec![json!("n"), json!("flag"), json!("note")],
            vec![json!(42), json!(true), json!(null)],
        ]);
        assert_eq!(data.records[0]["n"], "42");
        assert_eq!(data.records[0]["flag"], "true");
        assert_eq!(data.records[0]["note"], "");
    }

    #[test]
    fn test_normalize_empty_sheet() {
        let data = normalize_values(vec![]);
        assert!(data.columns.is_empty());
        assert!(data.records.is_empty());
    }

    #[test]
    fn test_normalize_header_only() {
        let data = normalize_values(vec![vec![json!("name")]]);
        assert_eq!(data.columns, vec!["name"]);
        assert!(data.records.is_empty());
    }
}
