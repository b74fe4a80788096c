//! Router configuration for Folio Streamer.
//!
//! # Route Structure
//!
//! ```text
//! /health                              - Health check
//! /archives                            - List (GET) / add (POST)
//! /archives/{hash}                     - Remove (DELETE)
//! /archives/{hash}/status              - Materialize and report readiness
//! /archives/{hash}/pages               - Paginated page list
//! /archives/{hash}/pages/{page}        - Page bytes
//! /cache                               - Cache usage
//! /cache/clear                         - Delete the whole cache (POST)
//! /cache/purge                         - Eviction sweep (POST)
//! ```

use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    add_archive_handler, cache_stats_handler, clear_cache_handler, health_handler,
    list_archives_handler, page_handler, pages_handler, purge_cache_handler,
    remove_archive_handler, status_handler, AppState,
};
use crate::fetch::ArchiveSource;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age for page bytes, in seconds
    pub cache_max_age: u32,

    /// Page batch size when the client omits `limit`
    pub default_page_limit: usize,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// By default CORS allows any origin, max-age is one hour and tracing is on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            default_page_limit: crate::pages::DEFAULT_PAGE_LIMIT,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins. An empty list disallows all
    /// cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_default_page_limit(mut self, limit: usize) -> Self {
        self.default_page_limit = limit;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Build the application router with CORS and optional request tracing.
pub fn create_router<S>(state: AppState<S>, config: RouterConfig) -> Router
where
    S: ArchiveSource,
{
    let state = state
        .with_cache_max_age(config.cache_max_age)
        .with_default_page_limit(config.default_page_limit);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/archives",
            get(list_archives_handler::<S>).post(add_archive_handler::<S>),
        )
        .route("/archives/{hash}", delete(remove_archive_handler::<S>))
        .route("/archives/{hash}/status", get(status_handler::<S>))
        .route("/archives/{hash}/pages", get(pages_handler::<S>))
        .route("/archives/{hash}/pages/{page}", get(page_handler::<S>))
        .route("/cache", get(cache_stats_handler::<S>))
        .route("/cache/clear", post(clear_cache_handler::<S>))
        .route("/cache/purge", post(purge_cache_handler::<S>))
        .with_state(state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}
