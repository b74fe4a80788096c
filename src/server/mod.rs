//! HTTP server layer for Folio Streamer.
//!
//! A thin JSON surface over [`Engine`](crate::engine::Engine).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │  ┌─────────────────────────┐  ┌─────────────────────────────┐   │
//! │  │        handlers         │  │           routes            │   │
//! │  │ (requests, error codes) │  │ (router, CORS, tracing)     │   │
//! │  └─────────────────────────┘  └─────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, AddArchiveRequest, ApiError, AppState, ArchiveSummary, ArchivesResponse,
    ErrorResponse, HealthResponse, PageLink, PagesResponse, PurgeResponse,
};
pub use routes::{create_router, RouterConfig};
