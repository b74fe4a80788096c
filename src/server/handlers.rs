//! HTTP request handlers for the Folio Streamer API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /archives` - Catalog listing
//! - `POST /archives` - Add an archive to the catalog
//! - `DELETE /archives/{hash}` - Remove an archive and its cached pages
//! - `GET /archives/{hash}/status` - Materialize and report readiness
//! - `GET /archives/{hash}/pages` - Paginated page list
//! - `GET /archives/{hash}/pages/{page}` - Page bytes
//! - `GET /cache` - Cache usage
//! - `POST /cache/clear` - Delete the whole cache
//! - `POST /cache/purge` - Run an eviction sweep

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::engine::{CacheStats, Engine, Readiness};
use crate::error::{EngineError, LocatorError, MaterializeError, PageError};
use crate::fetch::ArchiveSource;
use crate::locator::{ArchiveFormat, Catalog, Locator};
use crate::pages::DEFAULT_PAGE_LIMIT;

/// Upper bound on `wait_ms` for status requests.
pub const MAX_STATUS_WAIT: Duration = Duration::from_secs(120);

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
pub struct AppState<S: ArchiveSource> {
    pub engine: Arc<Engine<S, Catalog>>,

    /// Catalog the engine resolves hashes through
    pub catalog: Arc<Catalog>,

    /// Cache-Control max-age for page bytes, in seconds
    pub cache_max_age: u32,

    /// Page batch size when `limit` is omitted
    pub default_page_limit: usize,
}

impl<S: ArchiveSource> AppState<S> {
    pub fn new(engine: Arc<Engine<S, Catalog>>) -> Self {
        let catalog = Arc::clone(engine.locators());
        Self {
            engine,
            catalog,
            cache_max_age: 3600,
            default_page_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_default_page_limit(mut self, limit: usize) -> Self {
        self.default_page_limit = limit;
        self
    }
}

impl<S: ArchiveSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            catalog: Arc::clone(&self.catalog),
            cache_max_age: self.cache_max_age,
            default_page_limit: self.default_page_limit,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Body of `POST /archives`.
#[derive(Debug, Deserialize)]
pub struct AddArchiveRequest {
    pub url: String,

    #[serde(default)]
    pub title: Option<String>,
}

/// Query of `GET /archives/{hash}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusQueryParams {
    /// How long to wait for materialization, in milliseconds
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

/// Query of `GET /archives/{hash}/pages`.
#[derive(Debug, Deserialize)]
pub struct PagesQueryParams {
    /// 0-based index of the first page returned
    #[serde(default)]
    pub offset: i64,

    /// Batch size (clamped to 1-100)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Path of `GET /archives/{hash}/pages/{page}`.
///
/// `page` accepts `3` as well as `3.jpg`.
#[derive(Debug, Deserialize)]
pub struct PagePathParams {
    pub hash: String,
    pub page: String,
}

impl PagePathParams {
    pub fn page_number(&self) -> Result<i64, std::num::ParseIntError> {
        let raw = self.page.strip_suffix(".jpg").unwrap_or(&self.page);
        raw.parse()
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "fetch_failed")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One catalog entry.
#[derive(Debug, Serialize)]
pub struct ArchiveSummary {
    pub hash: String,
    pub title: String,
    pub url: String,
    pub format: ArchiveFormat,

    /// Whether a Ready artifact set is cached
    pub cached: bool,
}

impl ArchiveSummary {
    fn new(locator: &Locator, cached: bool) -> Self {
        Self {
            hash: locator.hash().to_string(),
            title: locator.title().to_string(),
            url: locator.source_url().to_string(),
            format: locator.format(),
            cached,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArchivesResponse {
    pub archives: Vec<ArchiveSummary>,
}

#[derive(Debug, Serialize)]
pub struct RemoveArchiveResponse {
    pub hash: String,

    /// Whether cached pages were deleted too
    pub evicted: bool,
}

/// One page reference in a pages response.
#[derive(Debug, Serialize)]
pub struct PageLink {
    pub page: usize,
    pub url: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct PagesResponse {
    pub pages: Vec<PageLink>,
    pub current_offset: usize,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub evicted: Vec<String>,
    pub freed_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors surfaced by the handlers.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    BadRequest(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<LocatorError> for ApiError {
    fn from(err: LocatorError) -> Self {
        ApiError::Engine(err.into())
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Engine(err) => match err {
                EngineError::Materialize(e) => match e {
                    MaterializeError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                    MaterializeError::FetchFailed(_) => (StatusCode::BAD_GATEWAY, "fetch_failed"),
                    MaterializeError::CorruptArchive(_) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "corrupt_archive")
                    }
                    MaterializeError::EmptyArchive => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "empty_archive")
                    }
                    MaterializeError::Storage(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
                    }
                    MaterializeError::Aborted(_) => (StatusCode::INTERNAL_SERVER_ERROR, "aborted"),
                },
                EngineError::Page(e) => match e {
                    PageError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                    PageError::PageNotFound { .. } => (StatusCode::NOT_FOUND, "page_not_found"),
                    PageError::InvalidOffset { .. } => (StatusCode::BAD_REQUEST, "invalid_offset"),
                    PageError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
                },
                EngineError::Locator(e) => match e {
                    LocatorError::Duplicate { .. } => (StatusCode::CONFLICT, "duplicate"),
                    LocatorError::Catalog(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "catalog_error")
                    }
                    _ => (StatusCode::BAD_REQUEST, "invalid_locator"),
                },
                EngineError::Maintenance(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "maintenance_failed")
                }
            },
        }
    }
}

/// Logs by severity: 5xx at ERROR, 404 at DEBUG, other 4xx at WARN.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.parts();
        let message = match &self {
            ApiError::Engine(e) => e.to_string(),
            ApiError::BadRequest(message) => message.clone(),
        };

        if status.is_server_error() {
            error!(error_type, status = status.as_u16(), "Server error: {}", message);
        } else if status == StatusCode::NOT_FOUND {
            debug!(error_type, status = status.as_u16(), "Not found: {}", message);
        } else {
            warn!(error_type, status = status.as_u16(), "Client error: {}", message);
        }

        let body = ErrorResponse::with_status(error_type, message, status);
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /archives`: catalog entries sorted by title, each flagged `cached`
/// when its pages are on disk.
pub async fn list_archives_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
) -> Json<ArchivesResponse> {
    let archives = state
        .catalog
        .list()
        .await
        .iter()
        .map(|locator| ArchiveSummary::new(locator, state.engine.is_ready(locator.hash())))
        .collect();
    Json(ArchivesResponse { archives })
}

/// `POST /archives` with `{"url": "...", "title": "..."}`.
///
/// # Response
///
/// - `201 Created`: the new catalog entry
/// - `400 Bad Request`: unparseable URL, non-HTTP scheme or unsupported extension
/// - `409 Conflict`: the archive is already in the catalog
pub async fn add_archive_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
    Json(request): Json<AddArchiveRequest>,
) -> Result<Response, ApiError> {
    let locator = match request.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => Locator::with_title(&request.url, title)?,
        _ => Locator::from_url(&request.url)?,
    };
    state.catalog.add_locator(locator.clone()).await?;
    info!(hash = locator.hash(), url = %locator.source_url(), "Archive added");

    let cached = state.engine.is_ready(locator.hash());
    Ok((
        StatusCode::CREATED,
        Json(ArchiveSummary::new(&locator, cached)),
    )
        .into_response())
}

/// `DELETE /archives/{hash}`: removes the catalog entry and, unless it is in
/// use, its cached pages.
pub async fn remove_archive_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
    Path(hash): Path<String>,
) -> Result<Json<RemoveArchiveResponse>, ApiError> {
    if state.catalog.remove(&hash).await.is_none() {
        return Err(EngineError::from(MaterializeError::NotFound { hash }).into());
    }
    let evicted = state.engine.forget(&hash).await?;
    info!(hash = %hash, evicted, "Archive removed");
    Ok(Json(RemoveArchiveResponse { hash, evicted }))
}

/// `GET /archives/{hash}/status?wait_ms=`
///
/// Starts materialization if needed and waits up to `wait_ms` (default: the
/// engine's ready wait, capped at two minutes).
///
/// # Response
///
/// - `200 OK`: `{"status": "ready", "total_pages": N}`
/// - `202 Accepted`: `{"status": "processing"}`
/// - `404`, `422`, `502`: materialization failed
pub async fn status_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
    Path(hash): Path<String>,
    Query(query): Query<StatusQueryParams>,
) -> Result<Response, ApiError> {
    let wait = query
        .wait_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| state.engine.ready_wait())
        .min(MAX_STATUS_WAIT);

    let readiness = state.engine.ensure_ready_within(&hash, wait).await?;
    Ok(readiness_response(readiness))
}

/// `GET /archives/{hash}/pages?offset=&limit=`
///
/// # Response
///
/// - `200 OK`: `{"pages": [{"page", "url", "size"}], "current_offset", "total_pages"}`
/// - `202 Accepted`: still materializing
/// - `400 Bad Request`: negative offset
pub async fn pages_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
    Path(hash): Path<String>,
    Query(query): Query<PagesQueryParams>,
) -> Result<Response, ApiError> {
    if query.offset < 0 {
        return Err(EngineError::from(PageError::InvalidOffset {
            offset: query.offset,
        })
        .into());
    }

    // Held until the response is built so eviction cannot race the listing.
    let _lease = state.engine.select(&hash);
    if let Some(response) = wait_until_ready(&state, &hash).await? {
        return Ok(response);
    }

    let limit = query.limit.unwrap_or(state.default_page_limit);
    let slice = state.engine.list(&hash, query.offset, limit)?;

    let pages = slice
        .pages
        .iter()
        .map(|p| PageLink {
            page: p.page,
            url: format!("/archives/{}/pages/{}", hash, p.page),
            size: p.size,
        })
        .collect();

    Ok(Json(PagesResponse {
        pages,
        current_offset: slice.offset,
        total_pages: slice.total_pages,
    })
    .into_response())
}

/// `GET /archives/{hash}/pages/{page}`
///
/// # Headers
///
/// - `Content-Type: image/jpeg`
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Page-Cache-Hit: true|false`
pub async fn page_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<PagePathParams>,
) -> Result<Response, ApiError> {
    let page = params
        .page_number()
        .map_err(|_| ApiError::BadRequest(format!("Invalid page number: {}", params.page)))?;

    let _lease = state.engine.select(&params.hash);
    if let Some(response) = wait_until_ready(&state, &params.hash).await? {
        return Ok(response);
    }

    let data = state.engine.read_page(&params.hash, page).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, data.content_type.to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.cache_max_age),
            ),
            (
                header::HeaderName::from_static("x-page-cache-hit"),
                data.cache_hit.to_string(),
            ),
        ],
        Body::from(data.data),
    )
        .into_response())
}

/// `GET /cache`
pub async fn cache_stats_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
) -> Json<CacheStats> {
    Json(state.engine.stats().await)
}

/// `POST /cache/clear`
pub async fn clear_cache_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
) -> Result<Json<ClearResponse>, ApiError> {
    state.engine.clear_all().await?;
    Ok(Json(ClearResponse {
        status: "cleared".to_string(),
    }))
}

/// `POST /cache/purge`
pub async fn purge_cache_handler<S: ArchiveSource>(
    State(state): State<AppState<S>>,
) -> Json<PurgeResponse> {
    let report = state.engine.purge_to_budget().await;
    Json(PurgeResponse {
        evicted: report.evicted,
        freed_bytes: report.freed_bytes,
        total_bytes: report.total_bytes,
    })
}

/// Materialize on demand; `Some(202)` if the archive is still processing.
async fn wait_until_ready<S: ArchiveSource>(
    state: &AppState<S>,
    hash: &str,
) -> Result<Option<Response>, ApiError> {
    if state.engine.is_ready(hash) {
        return Ok(None);
    }
    match state.engine.ensure_ready(hash).await? {
        Readiness::Ready { .. } => Ok(None),
        Readiness::Processing => Ok(Some(readiness_response(Readiness::Processing))),
    }
}

fn readiness_response(readiness: Readiness) -> Response {
    let status = match readiness {
        Readiness::Ready { .. } => StatusCode::OK,
        Readiness::Processing => StatusCode::ACCEPTED,
    };
    (status, Json(readiness)).into_response()
}
