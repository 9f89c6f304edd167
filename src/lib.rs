//! PageRunner - Concurrent Page Scraping Engine
//!
//! Runs a list of scraping tasks over a fixed number of workers. Each task
//! loads one url into a page leased from a bounded page pool, extracts a set
//! of named fields by CSS selector and hands the result to a result store
//! keyed by (url, category). Every stage runs under a deadline: the run,
//! each task and each phase inside a task.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`tasks`]: Task descriptors, results, loading and validation
//! - [`scrape`]: Browser capability, page pool and extraction pipeline
//! - [`execution`]: Deadlines, worker pool and the run engine
//! - [`store`]: JSON-file result store
//! - [`monitoring`]: Resource usage tracking and execution timeline
//! - [`config`]: Timeouts and pool sizing
//! - [`error`]: Error types for every layer
//!
//! # Example
//!
//! ```rust,no_run
//! use pagerunner::execution::Engine;
//! use pagerunner::scrape::HttpBrowser;
//! use pagerunner::store::ResultStore;
//! use pagerunner::load_tasks;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load tasks from JSON
//!     let tasks = load_tasks("tasks.json")?;
//!
//!     // Create the engine
//!     let mut engine = Engine::new(tasks, HttpBrowser::new()?);
//!     engine.set_workers(6);
//!     engine.set_max_pages(10);
//!     engine.set_store(ResultStore::open("results.json")?);
//!
//!     // Run until done or cancelled
//!     let summary = engine.run(CancellationToken::new()).await?;
//!     println!("{:?}", summary);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod scrape;
pub mod store;
pub mod tasks;

// Re-export commonly used types
pub use config::{PhaseTimeouts, PoolConfig, Timeouts};
pub use execution::engine::{Engine, RunSummary};
pub use tasks::loader::load_tasks;
pub use tasks::model::{ExtractionResult, TaskDescriptor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "PageRunner";
