//! Core data models used throughout Sheetview.
//!
//! These types represent the raw sheet rows, the per-request transform
//! options, and the paginated view returned to callers.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;

/// One row of a sheet: an ordered column → string-value map.
///
/// The column set is uniform across all records of one sheet; absent cells
/// are empty strings, never missing keys. Column order is tracked separately
/// in [`SheetData::columns`].
pub type Record = IndexMap<String, String>;

/// A raw rectangular dataset as returned by a [`crate::source::SheetSource`].
#[derive(Debug, Clone)]
pub struct SheetData {
    pub records: Vec<Record>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
}

impl Period {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayFilter {
    Today,
    Yesterday,
    Past7,
}

impl DayFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "today" => Some(Self::Today),
            "yesterday" => Some(Self::Yesterday),
            "past_7" => Some(Self::Past7),
            _ => None,
        }
    }
}

/// Declarative description of one derived view over a sheet.
///
/// Constructed once per inbound request, after query-parameter clamping.
/// Invalid inputs never land here — the HTTP layer degrades them to defaults
/// and records a warning instead.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub search_term: Option<String>,
    pub page: usize,
    pub page_size: usize,
    pub sort_column: Option<String>,
    pub sort_order: SortOrder,
    pub group_by_period: Option<Period>,
    pub timestamp_column: Option<String>,
    pub day_filter: Option<DayFilter>,
    pub dedupe_field: Option<String>,
    pub dedupe_timestamp: Option<String>,
}

/// Aggregated row produced by time-based grouping; replaces individual
/// records in the view when grouping is active.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroupSummary {
    pub period_label: String,
    pub count: usize,
    pub period_start: NaiveDateTime,
}

/// One output row: either a field row or a group summary.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Row {
    Record(Record),
    Group(GroupSummary),
}

/// The derived, paginated view over one sheet. Produced fresh per request;
/// only the raw dataset behind it is cached.
#[derive(Debug, Clone, Serialize)]
pub struct ResultView {
    pub rows: Vec<Row>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub columns: Vec<String>,
    pub detected_timestamp_columns: Vec<String>,
    pub grouped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    /// True when the source fetch failed and an expired cache entry was
    /// served instead. Observability only — not an error.
    pub stale: bool,
    /// Parameter degradations and skipped stages, e.g. a requested
    /// `sort_column` that is not a detected timestamp column.
    pub warnings: Vec<String>,
}
