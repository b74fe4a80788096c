//! Configuration management for Folio Streamer.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `FOLIO_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `FOLIO_HOST` - Server bind address (default: 0.0.0.0)
//! - `FOLIO_PORT` - Server port (default: 3000)
//! - `FOLIO_CACHE_DIR` - Cache root directory (default: ./folio-cache)
//! - `FOLIO_CACHE_BUDGET` - Disk budget, e.g. `2GB` (default: 1GB)
//! - `FOLIO_PAGE_CACHE` - In-memory page cache size (default: 64MB)
//! - `FOLIO_CATALOG` - JSON catalog to load at startup
//! - `FOLIO_FETCH_TIMEOUT` - Download timeout in seconds (default: 120)
//! - `FOLIO_MAX_REDIRECTS` - Redirect limit (default: 5)
//! - `FOLIO_MAX_ARCHIVE_SIZE` - Largest archive accepted, e.g. `500MB`
//! - `FOLIO_USER_AGENT` - User agent for downloads
//! - `FOLIO_KEEP_ARCHIVES` - Keep downloaded archives next to their pages
//! - `FOLIO_RAR_BACKEND` - `native` or `command` (default: native)
//! - `FOLIO_READY_WAIT` - Seconds a request waits for materialization (default: 30)
//! - `FOLIO_PAGE_LIMIT` - Default page batch size (default: 5)
//! - `FOLIO_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `FOLIO_CORS_ORIGINS` - Allowed CORS origins (comma-separated)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::archive::{default_unpack_commands, RarBackend};
use crate::engine::EngineConfig;
use crate::fetch::{FetchConfig, DEFAULT_MAX_REDIRECTS};
use crate::materialize::MaterializeOptions;
use crate::pages::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 3000;

pub const DEFAULT_CACHE_DIR: &str = "./folio-cache";

pub const DEFAULT_CACHE_BUDGET: &str = "1GB";

pub const DEFAULT_PAGE_CACHE: &str = "64MB";

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_READY_WAIT_SECS: u64 = 30;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// How RAR and CBR archives are unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RarBackendKind {
    /// In-process unrar library
    Native,
    /// External `unrar` / `7z` commands
    Command,
}

/// Folio Streamer - on-demand pages from remote comic archives.
///
/// Downloads CBZ/CBR/CBT archives on first use, transcodes their images into
/// a disk cache bounded by a byte budget and serves the pages over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "folio-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "FOLIO_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "FOLIO_PORT")]
    pub port: u16,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Directory holding materialized archives.
    #[arg(long, default_value = DEFAULT_CACHE_DIR, env = "FOLIO_CACHE_DIR")]
    pub cache_dir: PathBuf,

    /// Disk budget for the cache (e.g. `500MB`, `2GB`, or plain bytes).
    #[arg(
        long,
        default_value = DEFAULT_CACHE_BUDGET,
        value_parser = parse_byte_size,
        env = "FOLIO_CACHE_BUDGET"
    )]
    pub cache_budget: u64,

    /// In-memory hot page cache size. `0` disables it.
    #[arg(
        long,
        default_value = DEFAULT_PAGE_CACHE,
        value_parser = parse_byte_size,
        env = "FOLIO_PAGE_CACHE"
    )]
    pub page_cache: u64,

    /// Keep downloaded archives next to their pages.
    ///
    /// Kept archives count toward the budget but skip the download when pages
    /// are rebuilt.
    #[arg(long, default_value_t = false, env = "FOLIO_KEEP_ARCHIVES")]
    pub keep_archives: bool,

    // =========================================================================
    // Archive Configuration
    // =========================================================================
    /// JSON catalog of archives to serve (`{"archives": [{"url": ..., "title": ...}]}`).
    #[arg(long, env = "FOLIO_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// RAR extraction backend.
    #[arg(long, value_enum, default_value_t = RarBackendKind::Native, env = "FOLIO_RAR_BACKEND")]
    pub rar_backend: RarBackendKind,

    // =========================================================================
    // Fetch Configuration
    // =========================================================================
    /// Archive download timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS, env = "FOLIO_FETCH_TIMEOUT")]
    pub fetch_timeout: u64,

    /// Maximum redirects followed per download.
    #[arg(long, default_value_t = DEFAULT_MAX_REDIRECTS, env = "FOLIO_MAX_REDIRECTS")]
    pub max_redirects: usize,

    /// Largest archive accepted for download.
    #[arg(long, value_parser = parse_byte_size, env = "FOLIO_MAX_ARCHIVE_SIZE")]
    pub max_archive_size: Option<u64>,

    /// User agent sent with downloads.
    #[arg(long, env = "FOLIO_USER_AGENT")]
    pub user_agent: Option<String>,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// Seconds a page request waits for materialization before answering 202.
    #[arg(long, default_value_t = DEFAULT_READY_WAIT_SECS, env = "FOLIO_READY_WAIT")]
    pub ready_wait: u64,

    /// Page batch size when clients omit `limit` (1-100).
    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT, env = "FOLIO_PAGE_LIMIT")]
    pub page_limit: usize,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "FOLIO_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "FOLIO_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_budget == 0 {
            return Err("cache_budget must be greater than 0".to_string());
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(
                "Cache directory is required. Set --cache-dir or FOLIO_CACHE_DIR".to_string(),
            );
        }

        if self.fetch_timeout == 0 {
            return Err("fetch_timeout must be greater than 0".to_string());
        }

        if self.page_limit == 0 || self.page_limit > MAX_PAGE_LIMIT {
            return Err(format!("page_limit must be between 1 and {}", MAX_PAGE_LIMIT));
        }

        if self.max_archive_size == Some(0) {
            return Err("max_archive_size must be greater than 0".to_string());
        }

        if usize::try_from(self.page_cache).is_err() {
            return Err("page_cache is too large for this platform".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Download settings for the HTTP archive source.
    pub fn fetch_config(&self) -> FetchConfig {
        let mut fetch = FetchConfig {
            timeout: Duration::from_secs(self.fetch_timeout),
            max_redirects: self.max_redirects,
            max_bytes: self.max_archive_size,
            ..FetchConfig::default()
        };
        if let Some(ref agent) = self.user_agent {
            fetch.user_agent = agent.clone();
        }
        fetch
    }

    pub fn rar_backend(&self) -> RarBackend {
        match self.rar_backend {
            RarBackendKind::Native => RarBackend::Native,
            RarBackendKind::Command => RarBackend::Command(default_unpack_commands()),
        }
    }

    /// Engine settings (call `validate()` first).
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            materialize: MaterializeOptions {
                rar_backend: self.rar_backend(),
                keep_archives: self.keep_archives,
                ..MaterializeOptions::default()
            },
            page_cache_bytes: usize::try_from(self.page_cache).unwrap_or(usize::MAX),
            ready_wait: Duration::from_secs(self.ready_wait),
        }
    }
}

/// Parse a human byte size: `1048576`, `512KB`, `64MB`, `1.5GB`, `2TB`.
///
/// Units are binary (1KB = 1024 bytes) and case-insensitive; a trailing
/// `iB` (`MiB`) is accepted too.
pub fn parse_byte_size(raw: &str) -> Result<u64, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("empty size".to_string());
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let unit = unit.trim().to_ascii_uppercase();

    let multiplier: u64 = match unit.as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        _ => return Err(format!("unknown size unit in '{}'", raw)),
    };

    if number.contains('.') {
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid size '{}'", raw))?;
        let bytes = value * multiplier as f64;
        if !bytes.is_finite() || bytes > u64::MAX as f64 {
            return Err(format!("size '{}' is too large", raw));
        }
        Ok(bytes.round() as u64)
    } else {
        let value: u64 = number
            .parse()
            .map_err(|_| format!("invalid size '{}'", raw))?;
        value
            .checked_mul(multiplier)
            .ok_or_else(|| format!("size '{}' is too large", raw))
    }
}

// =============================================================================
// Tests
// =============================================================================
