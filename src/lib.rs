//! # Sheetview
//!
//! A spreadsheet-backed data viewer. Sheetview pulls tabular data from the
//! Google Sheets API, caches it in memory with a TTL, and exposes it as a
//! searchable, sortable, deduplicable, time-grouped, paginated collection —
//! reachable as an HTML page and a JSON API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────┐   ┌────────────┐   ┌───────────┐
//! │ SheetSource │──▶│ SheetCache │──▶│ Transform  │──▶│ Formatter │
//! │ (Sheets v4) │   │ (TTL map)  │   │ pipeline   │   │ (links)   │
//! └─────────────┘   └────────────┘   └────────────┘   └─────┬─────┘
//!                                                           │
//!                                         ┌─────────────────┤
//!                                         ▼                 ▼
//!                                    ┌──────────┐     ┌──────────┐
//!                                    │   CLI    │     │   HTTP   │
//!                                    │  (shv)   │     │  (axum)  │
//!                                    └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shv sheets                        # list configured sheets
//! shv columns Signups               # show columns + detected timestamp columns
//! shv validate Signups created_at   # exact timestamp validation report
//! shv serve                         # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`timestamp`] | Timestamp parsing, detection, and validation |
//! | [`cache`] | TTL cache with stale-serve and single-flight refresh |
//! | [`source`] | Google Sheets API client |
//! | [`transform`] | Dedupe / filter / group / sort / search / paginate pipeline |
//! | [`format`] | Per-cell link and highlight formatting |
//! | [`server`] | HTTP server |

pub mod cache;
pub mod config;
pub mod format;
pub mod models;
pub mod server;
pub mod source;
pub mod timestamp;
pub mod transform;
