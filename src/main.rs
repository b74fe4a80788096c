//! Folio Streamer - on-demand pages from remote comic archives.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_streamer::{
    cache::{CacheLayout, CacheStore},
    config::Config,
    engine::Engine,
    fetch::HttpArchiveSource,
    locator::Catalog,
    server::{create_router, AppState, RouterConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Folio Streamer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Cache dir: {}", config.cache_dir.display());
    info!(
        "  Cache budget: {}MB, page cache: {}MB",
        config.cache_budget / (1024 * 1024),
        config.page_cache / (1024 * 1024)
    );
    info!("  RAR backend: {:?}", config.rar_backend);
    if config.keep_archives {
        info!("  Keeping downloaded archives");
    }

    let catalog = match config.catalog {
        Some(ref path) => match Catalog::load(path).await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("Failed to load catalog: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            warn!("  No catalog file given; add archives with POST /archives");
            Catalog::new()
        }
    };

    let source = match HttpArchiveSource::new(config.fetch_config()) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(&config.cache_dir).await {
        error!(
            "Failed to create cache dir {}: {}",
            config.cache_dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let store = Arc::new(CacheStore::new(
        CacheLayout::new(&config.cache_dir),
        config.cache_budget,
    ));
    let engine = Arc::new(Engine::new(
        source,
        Arc::new(catalog),
        store,
        config.engine_config(),
    ));

    match engine.recover().await {
        Ok(report) => info!(
            restored = report.restored,
            removed = report.removed,
            reusable = report.reusable,
            "Recovered cache index"
        ),
        Err(e) => {
            error!("Failed to recover cache: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let router = create_router(AppState::new(engine), build_router_config(&config));
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/archives", addr);
    info!("    curl http://{}/archives/<hash>/pages", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "folio_streamer=debug,tower_http=debug"
    } else {
        "folio_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_default_page_limit(config.page_limit)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
