use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    pub source: SourceConfig,
    pub sheets: Vec<SheetConfig>,
    /// Per-column cell templates with a single `{value}` placeholder,
    /// e.g. `ticket = "https://tracker.example.com/browse/{value}"`.
    #[serde(default)]
    pub link_templates: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_allowed_page_sizes")]
    pub allowed_page_sizes: Vec<usize>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            allowed_page_sizes: default_allowed_page_sizes(),
        }
    }
}

fn default_page_size() -> usize {
    25
}
fn default_allowed_page_sizes() -> Vec<usize> {
    vec![10, 25, 50, 100]
}

/// Tuning for timestamp column detection and validation.
///
/// Detection is a sampled heuristic (at most `sample_limit` non-empty values
/// per column are inspected); validation scans every row.
#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
    #[serde(default = "default_min_detect_fraction")]
    pub min_detect_fraction: f64,
    #[serde(default = "default_min_valid_fraction")]
    pub min_valid_fraction: f64,
    /// Additional strftime patterns tried after the built-in list.
    #[serde(default)]
    pub extra_formats: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sample_limit: default_sample_limit(),
            min_detect_fraction: default_min_detect_fraction(),
            min_valid_fraction: default_min_valid_fraction(),
            extra_formats: Vec::new(),
        }
    }
}

fn default_sample_limit() -> usize {
    200
}
fn default_min_detect_fraction() -> f64 {
    0.5
}
fn default_min_valid_fraction() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://sheets.googleapis.com".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetConfig {
    /// Display name, also the `sheet` query parameter value.
    pub name: String,
    pub sheet_id: String,
    #[serde(default = "default_tab")]
    pub tab: String,
}

fn default_tab() -> String {
    "Sheet1".to_string()
}

impl Config {
    /// Resolves a sheet by display name; `None` falls back to the first
    /// configured sheet.
    pub fn sheet(&self, name: Option<&str>) -> Option<&SheetConfig> {
        match name {
            Some(n) => self.sheets.iter().find(|s| s.name == n),
            None => self.sheets.first(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.sheets.is_empty() {
        anyhow::bail!("at least one [[sheets]] entry is required");
    }

    for (i, sheet) in config.sheets.iter().enumerate() {
        if sheet.name.trim().is_empty() {
            anyhow::bail!("sheets[{}].name must not be empty", i);
        }
        if sheet.sheet_id.trim().is_empty() {
            anyhow::bail!("sheets[{}].sheet_id must not be empty", i);
        }
        if config.sheets[..i].iter().any(|s| s.name == sheet.name) {
            anyhow::bail!("duplicate sheet name: '{}'", sheet.name);
        }
    }

    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    if config.pagination.allowed_page_sizes.is_empty() {
        anyhow::bail!("pagination.allowed_page_sizes must not be empty");
    }

    if config.pagination.allowed_page_sizes.contains(&0) {
        anyhow::bail!("pagination.allowed_page_sizes entries must be > 0");
    }

    if !config
        .pagination
        .allowed_page_sizes
        .contains(&config.pagination.default_page_size)
    {
        anyhow::bail!(
            "pagination.default_page_size ({}) must be one of allowed_page_sizes",
            config.pagination.default_page_size
        );
    }

    if !(0.0..=1.0).contains(&config.detection.min_detect_fraction)
        || config.detection.min_detect_fraction == 0.0
    {
        anyhow::bail!("detection.min_detect_fraction must be in (0.0, 1.0]");
    }

    if !(0.0..=1.0).contains(&config.detection.min_valid_fraction)
        || config.detection.min_valid_fraction == 0.0
    {
        anyhow::bail!("detection.min_valid_fraction must be in (0.0, 1.0]");
    }

    if config.detection.sample_limit == 0 {
        anyhow::bail!("detection.sample_limit must be > 0");
    }

    for (column, template) in &config.link_templates {
        if template.matches("{value}").count() != 1 {
            anyhow::bail!(
                "link_templates.{} must contain exactly one {{value}} placeholder",
                column
            );
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[server]
bind = "127.0.0.1:8080"

[source]
api_key = "test-key"

[[sheets]]
name = "Signups"
sheet_id = "abc123"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.pagination.default_page_size, 25);
        assert_eq!(config.pagination.allowed_page_sizes, vec![10, 25, 50, 100]);
        assert_eq!(config.detection.sample_limit, 200);
        assert_eq!(config.sheets[0].tab, "Sheet1");
        assert_eq!(config.source.base_url, "https://sheets.googleapis.com");
    }

    #[test]
    fn test_sheet_lookup_defaults_to_first() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sheet(None).unwrap().name, "Signups");
        assert_eq!(config.sheet(Some("Signups")).unwrap().sheet_id, "abc123");
        assert!(config.sheet(Some("Missing")).is_none());
    }

    #[test]
    fn test_no_sheets_rejected() {
        let file = write_config(
            r#"
[server]
bind = "127.0.0.1:8080"

[source]
api_key = "k"

sheets = []
"#,
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }

    #[test]
    fn test_duplicate_sheet_names_rejected() {
        let file = write_config(&format!(
            "{}\n[[sheets]]\nname = \"Signups\"\nsheet_id = \"other\"\n",
            MINIMAL
        ));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate sheet name"));
    }

    #[test]
    fn test_default_page_size_must_be_allowed() {
        let file = write_config(&format!(
            "{}\n[pagination]\ndefault_page_size = 33\n",
            MINIMAL
        ));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_bad_link_template_rejected() {
        let file = write_config(&format!(
            "{}\n[link_templates]\nticket = \"https://example.com/no-placeholder\"\n",
            MINIMAL
        ));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("{value}"));
    }
}
