//! # Sheetview CLI (`shv`)
//!
//! The `shv` binary starts the HTTP server and offers a few one-shot
//! commands for inspecting configured sheets from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! shv --config ./config/sheetview.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shv serve` | Start the HTTP server |
//! | `shv sheets` | List configured sheets |
//! | `shv columns [sheet]` | Fetch a sheet and print columns + detected timestamp columns |
//! | `shv validate <column> [--sheet <name>]` | Exact timestamp validation report for a column |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sheetview::config::{load_config, Config};
use sheetview::models::SheetData;
use sheetview::server::run_server;
use sheetview::source::{GoogleSheetSource, SheetSource};
use sheetview::timestamp::Interpreter;

/// Sheetview — a spreadsheet-backed data viewer with search, grouping,
/// deduplication, and a JSON API.
#[derive(Parser)]
#[command(
    name = "shv",
    about = "Sheetview — a spreadsheet-backed data viewer with search, grouping, and a JSON API",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sheetview.toml`. Sheet list, cache TTL,
    /// pagination, and source credentials are read from this file.
    #[arg(long, global = true, default_value = "./config/sheetview.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Serves the HTML viewer on `/` and the JSON API under `/api/*`,
    /// binding to `[server].bind` from the config file.
    Serve,

    /// List configured sheets.
    Sheets,

    /// Fetch a sheet and print its columns.
    ///
    /// Also runs the sampled timestamp detection heuristic and marks the
    /// columns it recognizes.
    Columns {
        /// Sheet display name; defaults to the first configured sheet.
        sheet: Option<String>,
    },

    /// Validate that a column contains timestamp data.
    ///
    /// Unlike detection, validation scans every row and prints exact
    /// parsed/total counts plus example values that failed to parse.
    Validate {
        /// Column name to validate.
        column: String,

        /// Sheet display name; defaults to the first configured sheet.
        #[arg(long)]
        sheet: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => run_server(&config).await,
        Commands::Sheets => {
            for sheet in &config.sheets {
                println!("{}  (tab: {})", sheet.name, sheet.tab);
            }
            Ok(())
        }
        Commands::Columns { sheet } => show_columns(&config, sheet.as_deref()).await,
        Commands::Validate { column, sheet } => {
            validate_column(&config, sheet.as_deref(), &column).await
        }
    }
}

async fn fetch_sheet(config: &Config, name: Option<&str>) -> Result<(String, SheetData)> {
    let sheet = config.sheet(name).ok_or_else(|| {
        anyhow::anyhow!("unknown sheet: '{}'", name.unwrap_or_default())
    })?;
    let source = GoogleSheetSource::new(&config.source)?;
    let data = source.fetch(&sheet.sheet_id, &sheet.tab).await?;
    Ok((sheet.name.clone(), data))
}

async fn show_columns(config: &Config, sheet: Option<&str>) -> Result<()> {
    let (name, data) = fetch_sheet(config, sheet).await?;
    let interpreter = Interpreter::new(&config.detection);
    let detected = interpreter.detect_timestamp_columns(&data.records, &data.columns);

    println!("{} ({} rows)", name, data.records.len());
    for column in &data.columns {
        if detected.contains(column) {
            println!("  {}  [timestamp]", column);
        } else {
            println!("  {}", column);
        }
    }
    Ok(())
}

async fn validate_column(config: &Config, sheet: Option<&str>, column: &str) -> Result<()> {
    let (name, data) = fetch_sheet(config, sheet).await?;
    if !data.columns.iter().any(|c| c == column) {
        anyhow::bail!("column '{}' not found in sheet '{}'", column, name);
    }

    let interpreter = Interpreter::new(&config.detection);
    let report = interpreter.validate_column(&data.records, column);

    println!("{} / {}", name, column);
    println!("  valid: {}", report.valid);
    println!("  parsed: {} / {}", report.parsed_count, report.total_count);
    if !report.sample_errors.is_empty() {
        println!("  failed examples:");
        for value in &report.sample_errors {
            println!("    {:?}", value);
        }
    }
    Ok(())
}
