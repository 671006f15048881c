//! Per-cell display formatting: clickable links, per-column value
//! templates, and search-term highlighting.
//!
//! Formatting runs after pagination, over the page of rows actually
//! returned — never over the full dataset. Each cell is independent of row
//! order, so the formatter knows nothing about the pipeline.

use std::collections::HashMap;

use regex::Regex;

use crate::models::Row;

pub struct Formatter {
    url_pattern: Regex,
    templates: HashMap<String, String>,
}

impl Formatter {
    /// `templates` maps column names to strings with a single `{value}`
    /// placeholder (validated at config load).
    pub fn new(templates: HashMap<String, String>) -> Self {
        Self {
            url_pattern: Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).unwrap(),
            templates,
        }
    }

    /// Formats every cell of the record rows in place. Group summary rows
    /// have no per-column text and pass through untouched.
    pub fn format_rows(&self, rows: &mut [Row], search_term: Option<&str>) {
        let highlight = search_term
            .filter(|t| !t.trim().is_empty())
            .map(|t| Regex::new(&format!("(?i){}", regex::escape(t.trim()))).unwrap());

        for row in rows {
            if let Row::Record(record) = row {
                for (column, value) in record.iter_mut() {
                    *value = self.format_cell(column, value, highlight.as_ref());
                }
            }
        }
    }

    /// URL-shaped content becomes an anchor; otherwise a configured column
    /// template is substituted (and anchored if the result is a URL); plain
    /// values pass through. Highlighting is skipped for cells carrying
    /// anchor markup so link HTML stays intact.
    pub fn format_cell(&self, column: &str, value: &str, highlight: Option<&Regex>) -> String {
        let formatted = if self.url_pattern.is_match(value) {
            self.linkify(value)
        } else if let Some(template) = self.templates.get(column) {
            if value.trim().is_empty() {
                value.to_string()
            } else {
                let substituted = template.replace("{value}", value);
                if self.url_pattern.is_match(&substituted) {
                    format!(r#"<a href="{0}" target="_blank">{0}</a>"#, substituted)
                } else {
                    substituted
                }
            }
        } else {
            value.to_string()
        };

        match highlight {
            Some(pattern) if !formatted.contains("<a href=") => pattern
                .replace_all(&formatted, |caps: &regex::Captures| {
                    format!("<mark>{}</mark>", &caps[0])
                })
                .into_owned(),
            _ => formatted,
        }
    }

    fn linkify(&self, value: &str) -> String {
        self.url_pattern
            .replace_all(value, |caps: &regex::Captures| {
                format!(r#"<a href="{0}" target="_blank">{0}</a>"#, &caps[0])
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use crate::models::GroupSummary;

    fn formatter() -> Formatter {
        Formatter::new(HashMap::new())
    }

    fn formatter_with_template(column: &str, template: &str) -> Formatter {
        let mut templates = HashMap::new();
        templates.insert(column.to_string(), template.to_string());
        Formatter::new(templates)
    }

    #[test]
    fn test_plain_value_unchanged() {
        assert_eq!(formatter().format_cell("name", "Alice", None), "Alice");
        assert_eq!(formatter().format_cell("name", "", None), "");
    }

    #[test]
    fn test_url_becomes_anchor() {
        let out = formatter().format_cell("link", "https://example.com/a?b=1", None);
        assert_eq!(
            out,
            r#"<a href="https://example.com/a?b=1" target="_blank">https://example.com/a?b=1</a>"#
        );
    }

    #[test]
    fn test_url_inside_text_is_wrapped_in_place() {
        let out = formatter().format_cell("note", "see https://example.com for details", None);
        assert_eq!(
            out,
            r#"see <a href="https://example.com" target="_blank">https://example.com</a> for details"#
        );
    }

    #[test]
    fn test_template_substitution() {
        let fmt = formatter_with_template("ticket", "https://tracker.example.com/browse/{value}");
        let out = fmt.format_cell("ticket", "OPS-42", None);
        assert_eq!(
            out,
            r#"<a href="https://tracker.example.com/browse/OPS-42" target="_blank">https://tracker.example.com/browse/OPS-42</a>"#
        );
    }

    #[test]
    fn test_template_with_plain_result_stays_text() {
        let fmt = formatter_with_template("code", "ref:{value}");
        assert_eq!(fmt.format_cell("code", "abc", None), "ref:abc");
    }

    #[test]
    fn test_template_skips_empty_values() {
        let fmt = formatter_with_template("ticket", "https://tracker.example.com/browse/{value}");
        assert_eq!(fmt.format_cell("ticket", "", None), "");
    }

    #[test]
    fn test_highlight_case_insensitive() {
        let highlight = Regex::new("(?i)ali").unwrap();
        let out = formatter().format_cell("name", "Alice and ALINA", Some(&highlight));
        assert_eq!(out, "<mark>Ali</mark>ce and <mark>ALI</mark>NA");
    }

    #[test]
    fn test_highlight_never_touches_anchors() {
        let highlight = Regex::new("(?i)example").unwrap();
        let out = formatter().format_cell("link", "https://example.com", Some(&highlight));
        assert!(!out.contains("<mark>"));
    }

    #[test]
    fn test_format_rows_formats_records_only() {
        let fmt = formatter();
        let mut record = IndexMap::new();
        record.insert("link".to_string(), "https://example.com".to_string());
        let mut rows = vec![
            Row::Record(record),
            Row::Group(GroupSummary {
                period_label: "2024-01-01".to_string(),
                count: 3,
                period_start: chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            }),
        ];

        fmt.format_rows(&mut rows, Some("example"));

        match &rows[0] {
            Row::Record(r) => assert!(r["link"].contains("<a href=")),
            Row::Group(_) => panic!("expected record row"),
        }
        match &rows[1] {
            Row::Group(g) => assert_eq!(g.period_label, "2024-01-01"),
            Row::Record(_) => panic!("expected group row"),
        }
    }
}
