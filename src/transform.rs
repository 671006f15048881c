//! The transform pipeline: raw sheet rows in, derived view out.
//!
//! Stages run in a fixed order — dedupe → day filter → group → sort →
//! search → paginate — because each later stage must see the fully reduced
//! set from the previous one (pagination acts on the post-search, post-sort
//! sequence, never on raw data). Every stage is a pure function over an
//! owned sequence; nothing here touches shared state or suspends.
//!
//! Per-record timestamp failures are never fatal: unparseable values are
//! dropped by the day filter, excluded from grouping buckets, sorted last,
//! and treated as earliest-possible by deduplication.

use std::cmp::Ordering;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

use crate::cache::CacheEntry;
use crate::models::{
    DayFilter, GroupSummary, Period, Record, RequestOptions, ResultView, Row, SortOrder,
};
use crate::timestamp::Interpreter;

/// Produces the derived view for one request. Pure except for reading the
/// server clock (day-filter windows are anchored to local midnight).
pub fn transform(entry: &CacheEntry, options: &RequestOptions, interp: &Interpreter) -> ResultView {
    transform_at(entry, options, interp, Local::now().naive_local())
}

fn transform_at(
    entry: &CacheEntry,
    options: &RequestOptions,
    interp: &Interpreter,
    now: NaiveDateTime,
) -> ResultView {
    let mut warnings = Vec::new();
    let mut records: Vec<Record> = entry.records.clone();

    if let Some(field) = options.dedupe_field.as_deref() {
        records = dedupe(records, field, options.dedupe_timestamp.as_deref(), interp);
    }

    if let Some(filter) = options.day_filter {
        match options.timestamp_column.as_deref() {
            Some(column) => records = filter_by_day(records, column, filter, interp, now),
            None => {
                warnings.push("day_filter requires timestamp_column; filter skipped".to_string())
            }
        }
    }

    let groups = match (options.group_by_period, options.timestamp_column.as_deref()) {
        (Some(period), Some(column)) => Some(group_by_period(&records, column, period, interp)),
        (Some(_), None) => {
            warnings
                .push("group_by_period requires timestamp_column; grouping skipped".to_string());
            None
        }
        (None, _) => None,
    };

    let grouped = groups.is_some();
    let search_term = options
        .search_term
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let (rows, total_count, total_pages) = match groups {
        Some(mut groups) => {
            // Group summaries always sort by period start; there is no
            // per-column text for search to act on.
            sort_groups(&mut groups, options.sort_order);
            let (page_rows, total, pages) = paginate(groups, options.page, options.page_size);
            (
                page_rows.into_iter().map(Row::Group).collect(),
                total,
                pages,
            )
        }
        None => {
            if let Some(column) = options.sort_column.as_deref() {
                if entry.detected_timestamp_columns.iter().any(|c| c == column) {
                    sort_records(&mut records, column, options.sort_order, interp);
                } else {
                    warnings.push(format!(
                        "sort_column '{}' is not a detected timestamp column; sorting skipped",
                        column
                    ));
                }
            }
            if let Some(term) = search_term.as_deref() {
                records = search(records, term);
            }
            let (page_rows, total, pages) = paginate(records, options.page, options.page_size);
            (
                page_rows.into_iter().map(Row::Record).collect(),
                total,
                pages,
            )
        }
    };

    ResultView {
        rows,
        total_count,
        page: options.page,
        page_size: options.page_size,
        total_pages,
        columns: entry.columns.clone(),
        detected_timestamp_columns: entry.detected_timestamp_columns.clone(),
        grouped,
        search_term,
        stale: false,
        warnings,
    }
}

/// Collapses records sharing a `field` value down to one representative:
/// the record with the latest parseable `timestamp_field` value. A record
/// whose timestamp parses always beats one whose timestamp does not; if no
/// timestamp in the group parses, the first-encountered record stands.
///
/// Records with an empty or missing `field` value all share the `""` key
/// and collapse together. Output order is first-encounter order of keys.
fn dedupe(
    records: Vec<Record>,
    field: &str,
    timestamp_field: Option<&str>,
    interp: &Interpreter,
) -> Vec<Record> {
    let mut groups: IndexMap<String, (Record, Option<NaiveDateTime>)> = IndexMap::new();

    for record in records {
        let key = record.get(field).cloned().unwrap_or_default();
        let ts = timestamp_field
            .and_then(|f| record.get(f))
            .and_then(|v| interp.parse(v));

        match groups.get_mut(&key) {
            None => {
                groups.insert(key, (record, ts));
            }
            Some((winner, winner_ts)) => {
                let replace = match (winner_ts.as_ref(), ts.as_ref()) {
                    (None, Some(_)) => true,
                    (Some(current), Some(candidate)) => candidate > current,
                    _ => false,
                };
                if replace {
                    *winner = record;
                    *winner_ts = ts;
                }
            }
        }
    }

    groups.into_values().map(|(record, _)| record).collect()
}

/// Keeps records whose `column` value parses and falls inside the window.
/// Unparseable or missing timestamps are dropped, not kept.
fn filter_by_day(
    records: Vec<Record>,
    column: &str,
    filter: DayFilter,
    interp: &Interpreter,
    now: NaiveDateTime,
) -> Vec<Record> {
    let midnight = now.date().and_hms_opt(0, 0, 0).unwrap();
    let (start, end, end_inclusive) = match filter {
        DayFilter::Today => (midnight, now, true),
        DayFilter::Yesterday => (midnight - Duration::days(1), midnight, false),
        DayFilter::Past7 => (midnight - Duration::days(6), now, true),
    };

    records
        .into_iter()
        .filter(|record| {
            record
                .get(column)
                .and_then(|v| interp.parse(v))
                .is_some_and(|ts| {
                    ts >= start && if end_inclusive { ts <= end } else { ts < end }
                })
        })
        .collect()
}

fn period_start(date: NaiveDate, period: Period) -> NaiveDate {
    match period {
        Period::Day => date,
        // ISO week, Monday start.
        Period::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
    }
}

/// Buckets records by calendar day or ISO week of the parsed `column`
/// value. Unparseable timestamps land in no bucket and count toward
/// nothing. Bucket order is first-encounter; the sort stage orders the
/// summaries by period start.
fn group_by_period(
    records: &[Record],
    column: &str,
    period: Period,
    interp: &Interpreter,
) -> Vec<GroupSummary> {
    let mut buckets: IndexMap<NaiveDate, usize> = IndexMap::new();

    for record in records {
        let Some(ts) = record.get(column).and_then(|v| interp.parse(v)) else {
            continue;
        };
        *buckets.entry(period_start(ts.date(), period)).or_insert(0) += 1;
    }

    buckets
        .into_iter()
        .map(|(start, count)| GroupSummary {
            period_label: match period {
                Period::Day => start.format("%Y-%m-%d").to_string(),
                Period::Week => format!("Week of {}", start.format("%Y-%m-%d")),
            },
            count,
            period_start: start.and_hms_opt(0, 0, 0).unwrap(),
        })
        .collect()
}

fn sort_groups(groups: &mut [GroupSummary], order: SortOrder) {
    groups.sort_by(|a, b| match order {
        SortOrder::Asc => a.period_start.cmp(&b.period_start),
        SortOrder::Desc => b.period_start.cmp(&a.period_start),
    });
}

/// Stable sort by the parsed `column` value. Records whose value does not
/// parse sort last regardless of direction.
fn sort_records(records: &mut Vec<Record>, column: &str, order: SortOrder, interp: &Interpreter) {
    let mut keyed: Vec<(Option<NaiveDateTime>, Record)> = std::mem::take(records)
        .into_iter()
        .map(|record| {
            let key = record.get(column).and_then(|v| interp.parse(v));
            (key, record)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, order));
    *records = keyed.into_iter().map(|(_, record)| record).collect();
}

fn compare_keys(
    a: &Option<NaiveDateTime>,
    b: &Option<NaiveDateTime>,
    order: SortOrder,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match order {
            SortOrder::Asc => a.cmp(b),
            SortOrder::Desc => b.cmp(a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Case-insensitive substring match over every column value; any column
/// containing the term keeps the record.
fn search(records: Vec<Record>, term: &str) -> Vec<Record> {
    let needle = term.to_lowercase();
    records
        .into_iter()
        .filter(|record| {
            record
                .values()
                .any(|value| value.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Slices out one page. `total_pages` is at least 1 even for an empty
/// sequence; a page past the end yields an empty slice with the requested
/// page number left intact so callers can detect out-of-range requests.
fn paginate<T>(rows: Vec<T>, page: usize, page_size: usize) -> (Vec<T>, usize, usize) {
    let total_count = rows.len();
    let total_pages = std::cmp::max(1, total_count.div_ceil(page_size));
    let start = page.saturating_sub(1).saturating_mul(page_size);
    let page_rows = rows.into_iter().skip(start).take(page_size).collect();
    (page_rows, total_count, total_pages)
}
