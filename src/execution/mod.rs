//! Scrape Execution Module
//!
//! Scheduling of scrape tasks over a fixed set of workers, bounded by a
//! chain of deadlines.
//!
//! # Architecture
//!
//! - [`deadline`]: Cancellation token plus expiry, nested run ⊇ task ⊇ phase
//! - [`pool`]: Generic worker pool over the [`Executor`] trait
//! - [`task`]: [`ScrapeTask`], the executor for one descriptor
//! - [`engine`]: Run orchestration and result persistence

pub mod deadline;
pub mod engine;
pub mod pool;
pub mod task;

pub use deadline::Deadline;
pub use engine::{Engine, RunSummary};
pub use pool::{BoxedExecutor, Completion, Executor, Outcome, ResultStream, WorkerPool};
pub use task::ScrapeTask;
