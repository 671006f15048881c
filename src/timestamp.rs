//! Timestamp parsing, column detection, and column validation.
//!
//! Cell values arrive as strings in whatever shape the sheet's authors typed.
//! [`Interpreter::parse`] turns them into a canonical [`NaiveDateTime`] in
//! server-local wall time: RFC 3339 first, then a list of common patterns.
//! Unparseable values are `None`, never an error.
//!
//! Column detection ([`Interpreter::detect_timestamp_columns`]) is a sampled
//! heuristic — at most `sample_limit` non-empty values per column are
//! inspected. Validation ([`Interpreter::validate_column`]) is exact and
//! scans every row.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::DetectionConfig;
use crate::models::Record;

/// Patterns tried in order after RFC 3339. Date-only patterns resolve to
/// midnight.
const BUILTIN_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m/%d/%Y %H:%M:%S",
];

/// How many unparseable example values a validation report carries.
const MAX_SAMPLE_ERRORS: usize = 5;

/// Exact validation report for one column, as returned by
/// `GET /api/validate-timestamp`.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnValidation {
    pub valid: bool,
    pub parsed_count: usize,
    /// Number of non-empty values scanned.
    pub total_count: usize,
    /// Up to five example values that failed to parse.
    pub sample_errors: Vec<String>,
}

pub struct Interpreter {
    formats: Vec<String>,
    sample_limit: usize,
    min_detect_fraction: f64,
    min_valid_fraction: f64,
}

impl Interpreter {
    pub fn new(detection: &DetectionConfig) -> Self {
        let mut formats: Vec<String> = BUILTIN_FORMATS.iter().map(|f| f.to_string()).collect();
        formats.extend(detection.extra_formats.iter().cloned());
        Self {
            formats,
            sample_limit: detection.sample_limit,
            min_detect_fraction: detection.min_detect_fraction,
            min_valid_fraction: detection.min_valid_fraction,
        }
    }

    /// Parses a single cell value. Timezone-qualified inputs are converted
    /// to server-local time and the offset dropped, so all parsed instants
    /// compare on the same clock.
    pub fn parse(&self, value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Local).naive_local());
        }

        for format in &self.formats {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
                return Some(dt);
            }
            if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                return Some(date.and_hms_opt(0, 0, 0).unwrap());
            }
        }

        None
    }

    /// Returns the columns whose sampled non-empty values parse at or above
    /// `min_detect_fraction`. Heuristic, not a correctness guarantee: at
    /// most `sample_limit` values are inspected per column.
    pub fn detect_timestamp_columns(&self, records: &[Record], columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .filter(|column| {
                let mut sampled = 0usize;
                let mut parsed = 0usize;
                for record in records {
                    let Some(value) = record.get(column.as_str()) else {
                        continue;
                    };
                    if value.trim().is_empty() {
                        continue;
                    }
                    sampled += 1;
                    if self.parse(value).is_some() {
                        parsed += 1;
                    }
                    if sampled >= self.sample_limit {
                        break;
                    }
                }
                sampled > 0 && parsed as f64 / sampled as f64 >= self.min_detect_fraction
            })
            .cloned()
            .collect()
    }

    /// Exact validation of one column: scans every row, counting non-empty
    /// values that parse. `valid` requires at least one non-empty value and
    /// a parsed fraction at or above `min_valid_fraction`.
    pub fn validate_column(&self, records: &[Record], column: &str) -> ColumnValidation {
        let mut parsed_count = 0usize;
        let mut total_count = 0usize;
        let mut sample_errors = Vec::new();

        for record in records {
            let Some(value) = record.get(column) else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            total_count += 1;
            if self.parse(value).is_some() {
                parsed_count += 1;
            } else if sample_errors.len() < MAX_SAMPLE_ERRORS {
                sample_errors.push(value.clone());
            }
        }

        let valid =
            total_count > 0 && parsed_count as f64 / total_count as f64 >= self.min_valid_fraction;

        ColumnValidation {
            valid,
            parsed_count,
            total_count,
            sample_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn interpreter() -> Interpreter {
        Interpreter::new(&DetectionConfig::default())
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<IndexMap<_, _>>()
    }

    #[test]
    fn test_parse_common_formats() {
        let interp = interpreter();
        for value in [
            "2024-01-15 10:30:00",
            "2024-01-15 10:30:00.250",
            "2024-01-15T10:30:00",
            "2024-01-15T10:30:00.250",
            "2024-01-15",
            "01/15/2024",
            "01/15/2024 10:30:00",
        ] {
            assert!(interp.parse(value).is_some(), "failed to parse: {}", value);
        }
    }

    #[test]
    fn test_parse_date_only_is_midnight() {
        let interp = interpreter();
        let parsed = interp.parse("2024-01-15").unwrap();
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_rfc3339_converts_to_local() {
        let interp = interpreter();
        let parsed = interp.parse("2024-01-15T10:30:00Z").unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let interp = interpreter();
        assert!(interp.parse("").is_none());
        assert!(interp.parse("   ").is_none());
        assert!(interp.parse("not a date").is_none());
        assert!(interp.parse("2024-13-45").is_none());
    }

    #[test]
    fn test_parse_extra_format_from_config() {
        let detection = DetectionConfig {
            extra_formats: vec!["%d.%m.%Y".to_string()],
            ..DetectionConfig::default()
        };
        let interp = Interpreter::new(&detection);
        assert!(interp.parse("15.01.2024").is_some());
        assert!(interpreter().parse("15.01.2024").is_none());
    }

    #[test]
    fn test_detect_by_fraction() {
        let interp = interpreter();
        // "when": every value parses. "what": none do. "mixed": 2 of 4.
        let records: Vec<Record> = (0..4)
            .map(|i| {
                record(&[
                    ("when", "2024-01-15"),
                    ("what", "hello"),
                    ("mixed", if i < 2 { "2024-01-15" } else { "n/a" }),
                ])
            })
            .collect();
        let columns = vec!["when".to_string(), "what".to_string(), "mixed".to_string()];
        let detected = interp.detect_timestamp_columns(&records, &columns);
        assert_eq!(detected, vec!["when".to_string(), "mixed".to_string()]);
    }

    #[test]
    fn test_detect_ignores_empty_values() {
        let interp = interpreter();
        let mut records = vec![record(&[("when", "2024-01-15")])];
        records.extend((0..10).map(|_| record(&[("when", "")])));
        let detected = interp.detect_timestamp_columns(&records, &["when".to_string()]);
        assert_eq!(detected, vec!["when".to_string()]);
    }

    #[test]
    fn test_detect_respects_sample_limit() {
        let detection = DetectionConfig {
            sample_limit: 10,
            ..DetectionConfig::default()
        };
        let interp = Interpreter::new(&detection);
        // First 10 values parse; everything after the sampling bound is
        // garbage and must not affect the verdict.
        let records: Vec<Record> = (0..50)
            .map(|i| record(&[("when", if i < 10 { "2024-01-15" } else { "garbage" })]))
            .collect();
        let detected = interp.detect_timestamp_columns(&records, &["when".to_string()]);
        assert_eq!(detected, vec!["when".to_string()]);
    }

    #[test]
    fn test_validate_scans_all_rows() {
        let detection = DetectionConfig {
            sample_limit: 10,
            ..DetectionConfig::default()
        };
        let interp = Interpreter::new(&detection);
        // Same dataset as the sampling test: validation ignores the sample
        // bound and sees all 40 failures.
        let records: Vec<Record> = (0..50)
            .map(|i| record(&[("when", if i < 10 { "2024-01-15" } else { "garbage" })]))
            .collect();
        let report = interp.validate_column(&records, "when");
        assert!(!report.valid);
        assert_eq!(report.parsed_count, 10);
        assert_eq!(report.total_count, 50);
        assert_eq!(report.sample_errors.len(), 5);
        assert_eq!(report.sample_errors[0], "garbage");
    }

    #[test]
    fn test_validate_valid_column() {
        let interp = interpreter();
        let records: Vec<Record> = (0..10)
            .map(|i| record(&[("when", if i < 8 { "2024-01-15" } else { "tbd" })]))
            .collect();
        let report = interp.validate_column(&records, "when");
        assert!(report.valid);
        assert_eq!(report.parsed_count, 8);
        assert_eq!(report.total_count, 10);
        assert_eq!(report.sample_errors, vec!["tbd".to_string(), "tbd".to_string()]);
    }

    #[test]
    fn test_validate_missing_or_empty_column() {
        let interp = interpreter();
        let records = vec![record(&[("when", "")])];
        let report = interp.validate_column(&records, "when");
        assert!(!report.valid);
        assert_eq!(report.total_count, 0);

        let report = interp.validate_column(&records, "absent");
        assert!(!report.valid);
        assert_eq!(report.total_count, 0);
    }
}
