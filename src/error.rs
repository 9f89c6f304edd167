//! Error Types
//!
//! One enum per layer. Lifecycle and configuration errors are returned to
//! the caller of the offending operation; task-level errors travel through
//! [`Executor::on_error`](crate::execution::Executor::on_error) and never
//! stop the pool.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Invalid run parameters, detected before anything starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    ZeroTimeout { name: &'static str },

    #[error(
        "phase timeouts add up to {total:?}, which exceeds the task timeout of {task:?}"
    )]
    PhasesExceedTask { total: Duration, task: Duration },

    #[error("{name} must be at least 1 (got {value})")]
    ZeroSize { name: &'static str, value: usize },
}

/// Worker pool lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("worker pool is already started")]
    AlreadyStarted,

    #[error("worker pool has not been started")]
    NotStarted,

    #[error("worker pool is no longer accepting tasks")]
    Stopped,

    #[error("worker pool was cancelled")]
    Cancelled,

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("result could not be delivered: stream was dropped")]
    ResultUndelivered,
}

/// Failures of the page backend.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("could not open a page: {0}")]
    Unavailable(String),

    #[error("no document loaded")]
    NotLoaded,

    #[error("unsupported url '{0}'")]
    UnsupportedUrl(String),

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Errors of one scrape attempt.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("page pool exhausted ({max} pages in use)")]
    Capacity { max: usize },

    #[error("page unavailable: {0}")]
    PageUnavailable(#[source] BrowserError),

    #[error("scraping of {url} cancelled")]
    Cancelled { url: String },

    #[error("failed to navigate to {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: BrowserError,
    },

    #[error("navigation to {url} timed out after {after:?}")]
    NavigationTimeout { url: String, after: Duration },

    #[error("failed to wait for {url} to load: {source}")]
    Load {
        url: String,
        #[source]
        source: BrowserError,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl ScrapeError {
    /// True for errors raised because a deadline or token fired.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Cancelled { .. } | Self::Pool(PoolError::Cancelled)
        )
    }
}

/// Result store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result {0} not found")]
    NotFound(Uuid),

    #[error("a result for ({url}, {category}) already exists as {existing}")]
    DuplicateKey {
        url: String,
        category: String,
        existing: Uuid,
    },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Task file loading errors.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read task file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON task file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse YAML task file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid task list:\n{0}")]
    Invalid(String),
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
