//! HTTP server.
//!
//! Exposes the cached sheet data as an HTML page and a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | HTML viewer page (drives the JSON API) |
//! | `GET`  | `/api/data` | Transformed, paginated rows |
//! | `GET`  | `/api/deduplicate` | Same, deduplication forced active |
//! | `GET`  | `/api/columns` | Columns + detected timestamp columns |
//! | `GET`  | `/api/validate-timestamp` | Exact validation report for one column |
//! | `GET`  | `/api/sheets` | Configured sheets |
//! | `GET`  | `/api/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "source_unavailable", "message": "sheet 'Signups' unavailable: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `source_unavailable` (503).
//!
//! Malformed query parameters — including an unknown `sheet` name — never
//! fail a request: they are clamped or degraded to defaults and reported
//! in the response's `warnings` list. A 5xx is returned only when the
//! sheet cannot be fetched and no cached copy exists.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the API can back
//! browser-based dashboards on other origins.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::{Fetched, SheetCache};
use crate::config::{Config, SheetConfig};
use crate::format::Formatter;
use crate::models::{DayFilter, Period, RequestOptions, ResultView, SortOrder};
use crate::source::{GoogleSheetSource, SheetSource};
use crate::timestamp::{ColumnValidation, Interpreter};
use crate::transform::transform;

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    cache: Arc<SheetCache>,
    source: Arc<dyn SheetSource>,
    interpreter: Arc<Interpreter>,
    formatter: Arc<Formatter>,
}

impl AppState {
    /// Builds the state from a config and a source implementation. Tests
    /// inject an in-process [`SheetSource`]; [`run_server`] wires up the
    /// Google client.
    pub fn new(config: Arc<Config>, source: Arc<dyn SheetSource>) -> Self {
        let interpreter = Arc::new(Interpreter::new(&config.detection));
        let cache = Arc::new(SheetCache::new(
            Duration::from_secs(config.cache.ttl_secs),
            interpreter.clone(),
        ));
        let formatter = Arc::new(Formatter::new(config.link_templates.clone()));
        Self {
            config,
            cache,
            source,
            interpreter,
            formatter,
        }
    }
}

/// Builds the application router. Exposed separately from [`run_server`]
/// so tests can drive it without binding a socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/api/data", get(handle_data))
        .route("/api/deduplicate", get(handle_deduplicate))
        .route("/api/columns", get(handle_columns))
        .route("/api/validate-timestamp", get(handle_validate_timestamp))
        .route("/api/sheets", get(handle_sheets))
        .route("/api/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server. Binds to `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let source = Arc::new(GoogleSheetSource::new(&config.source)?);
    let state = AppState::new(Arc::new(config.clone()), source);
    let bind_addr = config.server.bind.clone();
    let app = router(state);

    println!("sheetview listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"not_found"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn source_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "source_unavailable".to_string(),
        message: message.into(),
    }
}

// ============ Query parameters ============

/// Raw query parameters for the data endpoints. Everything is an optional
/// string so malformed input reaches [`build_options`], which degrades it
/// with a warning instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct DataParams {
    q: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
    sort_column: Option<String>,
    sort_order: Option<String>,
    group_by_period: Option<String>,
    timestamp_column: Option<String>,
    day_filter: Option<String>,
    dedupe_field: Option<String>,
    dedupe_timestamp: Option<String>,
    sheet: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Clamps raw query parameters into a valid [`RequestOptions`], collecting
/// a warning for every degraded value.
fn build_options(params: &DataParams, config: &Config) -> (RequestOptions, Vec<String>) {
    let mut warnings = Vec::new();
    let pagination = &config.pagination;

    let page = match non_empty(&params.page) {
        None => 1,
        Some(raw) => match raw.parse::<usize>() {
            Ok(page) if page >= 1 => page,
            _ => {
                warnings.push(format!("invalid page '{}'; using 1", raw));
                1
            }
        },
    };

    let page_size = match non_empty(&params.page_size) {
        None => pagination.default_page_size,
        Some(raw) => match raw.parse::<usize>() {
            Ok(size) if pagination.allowed_page_sizes.contains(&size) => size,
            _ => {
                warnings.push(format!(
                    "page_size '{}' is not allowed; using {}",
                    raw, pagination.default_page_size
                ));
                pagination.default_page_size
            }
        },
    };

    let sort_order = match non_empty(&params.sort_order) {
        None => SortOrder::default(),
        Some(raw) => SortOrder::parse(&raw).unwrap_or_else(|| {
            warnings.push(format!("invalid sort_order '{}'; using desc", raw));
            SortOrder::default()
        }),
    };

    let group_by_period = non_empty(&params.group_by_period).and_then(|raw| {
        let period = Period::parse(&raw);
        if period.is_none() {
            warnings.push(format!(
                "invalid group_by_period '{}'; must be 'day' or 'week'",
                raw
            ));
        }
        period
    });

    let day_filter = non_empty(&params.day_filter).and_then(|raw| {
        let filter = DayFilter::parse(&raw);
        if filter.is_none() {
            warnings.push(format!(
                "invalid day_filter '{}'; must be 'today', 'yesterday', or 'past_7'",
                raw
            ));
        }
        filter
    });

    let options = RequestOptions {
        search_term: non_empty(&params.q),
        page,
        page_size,
        sort_column: non_empty(&params.sort_column),
        sort_order,
        group_by_period,
        timestamp_column: non_empty(&params.timestamp_column),
        day_filter,
        dedupe_field: non_empty(&params.dedupe_field),
        dedupe_timestamp: non_empty(&params.dedupe_timestamp),
    };

    (options, warnings)
}

// ============ Shared handler plumbing ============

/// Resolves the `sheet` parameter. An unknown name degrades to the default
/// (first configured) sheet with a warning rather than failing the request.
fn resolve_sheet<'a>(
    config: &'a Config,
    name: Option<&str>,
) -> Result<(&'a SheetConfig, Option<String>), AppError> {
    let fallback = || {
        config
            .sheet(None)
            .ok_or_else(|| not_found("no sheets configured"))
    };

    match name {
        Some(requested) => match config.sheet(Some(requested)) {
            Some(sheet) => Ok((sheet, None)),
            None => {
                let sheet = fallback()?;
                Ok((
                    sheet,
                    Some(format!(
                        "unknown sheet '{}'; using '{}'",
                        requested, sheet.name
                    )),
                ))
            }
        },
        None => Ok((fallback()?, None)),
    }
}

async fn load_sheet(state: &AppState, sheet: &SheetConfig) -> Result<Fetched, AppError> {
    let source = state.source.clone();
    let sheet_id = sheet.sheet_id.clone();
    let tab = sheet.tab.clone();

    state
        .cache
        .get_or_fetch(&sheet.name, || async move {
            source.fetch(&sheet_id, &tab).await
        })
        .await
        .map_err(|err| source_unavailable(format!("sheet '{}' unavailable: {}", sheet.name, err)))
}

async fn data_view(
    state: AppState,
    params: DataParams,
    force_dedupe: bool,
) -> Result<ResultView, AppError> {
    let (sheet, sheet_warning) = resolve_sheet(&state.config, params.sheet.as_deref())?;
    let fetched = load_sheet(&state, sheet).await?;

    let (options, mut warnings) = build_options(&params, &state.config);
    if let Some(warning) = sheet_warning {
        warnings.insert(0, warning);
    }
    if force_dedupe && options.dedupe_field.is_none() {
        warnings.push(
            "dedupe_field is required to deduplicate; returning rows as-is".to_string(),
        );
    }

    let mut view = transform(&fetched.entry, &options, &state.interpreter);
    view.stale = fetched.stale;
    warnings.append(&mut view.warnings);
    view.warnings = warnings;

    let term = view.search_term.clone();
    state.formatter.format_rows(&mut view.rows, term.as_deref());

    Ok(view)
}

// ============ GET / ============

/// Serves the viewer page. The page reads its own query string and drives
/// `/api/data`, so `/?q=...&page=2` deep-links work.
async fn handle_index() -> Html<&'static str> {
    Html(include_str!("ui.html"))
}

// ============ GET /api/data ============

async fn handle_data(
    State(state): State<AppState>,
    Query(params): Query<DataParams>,
) -> Result<Json<ResultView>, AppError> {
    data_view(state, params, false).await.map(Json)
}

// ============ GET /api/deduplicate ============

async fn handle_deduplicate(
    State(state): State<AppState>,
    Query(params): Query<DataParams>,
) -> Result<Json<ResultView>, AppError> {
    data_view(state, params, true).await.map(Json)
}

// ============ GET /api/columns ============

#[derive(Serialize)]
struct ColumnsResponse {
    columns: Vec<String>,
    detected_timestamp_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SheetParams {
    sheet: Option<String>,
}

async fn handle_columns(
    State(state): State<AppState>,
    Query(params): Query<SheetParams>,
) -> Result<Json<ColumnsResponse>, AppError> {
    let (sheet, sheet_warning) = resolve_sheet(&state.config, params.sheet.as_deref())?;
    let fetched = load_sheet(&state, sheet).await?;

    Ok(Json(ColumnsResponse {
        columns: fetched.entry.columns.clone(),
        detected_timestamp_columns: fetched.entry.detected_timestamp_columns.clone(),
        warnings: sheet_warning.into_iter().collect(),
    }))
}

// ============ GET /api/validate-timestamp ============

#[derive(Debug, Deserialize)]
pub struct ValidateParams {
    sheet: Option<String>,
    column: Option<String>,
}

#[derive(Serialize)]
struct ValidateResponse {
    column: String,
    #[serde(flatten)]
    report: ColumnValidation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

async fn handle_validate_timestamp(
    State(state): State<AppState>,
    Query(params): Query<ValidateParams>,
) -> Result<Json<ValidateResponse>, AppError> {
    let column = params
        .column
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| bad_request("missing required parameter: column"))?;

    let (sheet, sheet_warning) = resolve_sheet(&state.config, params.sheet.as_deref())?;
    let fetched = load_sheet(&state, sheet).await?;

    let mut warnings: Vec<String> = sheet_warning.into_iter().collect();
    if !fetched.entry.columns.iter().any(|c| c == column) {
        warnings.push(format!(
            "column '{}' not found in sheet '{}'",
            column, sheet.name
        ));
    }

    // A column absent from the dataset naturally validates as
    // {valid: false, 0 parsed, 0 scanned}.
    let report = state
        .interpreter
        .validate_column(&fetched.entry.records, column);

    Ok(Json(ValidateResponse {
        column: column.to_string(),
        report,
        warnings,
    }))
}

// ============ GET /api/sheets ============

#[derive(Serialize)]
struct SheetsResponse {
    sheets: Vec<SheetInfo>,
}

#[derive(Serialize)]
struct SheetInfo {
    name: String,
    tab: String,
}

async fn handle_sheets(State(state): State<AppState>) -> Json<SheetsResponse> {
    Json(SheetsResponse {
        sheets: state
            .config
            .sheets
            .iter()
            .map(|s| SheetInfo {
                name: s.name.clone(),
                tab: s.tab.clone(),
            })
            .collect(),
    })
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
    /// Number of configured sheets.
    sheets: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sheets: state.config.sheets.len(),
    })
}
