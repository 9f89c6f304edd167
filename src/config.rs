//! Run Configuration
//!
//! Timeouts for every layer of the deadline chain and sizing for the
//! worker pool. Both are checked once, before a run starts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of workers when the machine reports more cores.
pub const DEFAULT_MAX_WORKERS: usize = 6;

/// Default ceiling on concurrently open pages.
pub const DEFAULT_MAX_PAGES: usize = 10;

/// Sub-deadlines for the phases of one scrape attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimeouts {
    /// Budget for navigating to the target
    pub navigation: Duration,
    /// Budget for one selector query
    pub query: Duration,
    /// Budget for reading the text of one element
    pub element_text: Duration,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(15),
            query: Duration::from_secs(5),
            element_text: Duration::from_secs(2),
        }
    }
}

impl PhaseTimeouts {
    /// Sum of all phase budgets.
    pub fn total(&self) -> Duration {
        self.navigation + self.query + self.element_text
    }
}

/// Timeouts for the whole deadline chain: run ⊇ task ⊇ phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Overall run budget; `None` means only the cancellation token ends a run
    pub run: Option<Duration>,
    /// Budget for a single task
    pub task: Duration,
    /// Per-phase budgets inside a task
    pub phases: PhaseTimeouts,
    /// How long to keep draining results after a run is cancelled
    pub shutdown_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            run: Some(Duration::from_secs(180)),
            task: Duration::from_secs(30),
            phases: PhaseTimeouts::default(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl Timeouts {
    /// Checks that every budget is positive and that the phases fit inside
    /// the task budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("task timeout", self.task),
            ("navigation timeout", self.phases.navigation),
            ("query timeout", self.phases.query),
            ("element text timeout", self.phases.element_text),
            ("shutdown grace period", self.shutdown_grace),
        ];

        for (name, value) in named {
            if value.is_zero() {
                return Err(ConfigError::ZeroTimeout { name });
            }
        }

        if matches!(self.run, Some(run) if run.is_zero()) {
            return Err(ConfigError::ZeroTimeout {
                name: "run timeout",
            });
        }

        let total = self.phases.total();
        if total > self.task {
            return Err(ConfigError::PhasesExceedTask {
                total,
                task: self.task,
            });
        }

        Ok(())
    }
}

/// Sizing of the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of parallel workers
    pub workers: usize,
    /// Capacity of the task queue
    pub queue_capacity: usize,
    /// Capacity of the output stream
    pub result_capacity: usize,
}

impl PoolConfig {
    /// Creates a configuration with the output buffer sized to the larger of
    /// the queue capacity and the worker count.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers,
            queue_capacity,
            result_capacity: queue_capacity.max(workers),
        }
    }

    /// Overrides the output buffer capacity.
    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    /// Checks that every size is at least one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("workers", self.workers),
            ("queue capacity", self.queue_capacity),
            ("result capacity", self.result_capacity),
        ];

        for (name, value) in named {
            if value == 0 {
                return Err(ConfigError::ZeroSize { name, value });
            }
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(default_workers(), 64)
    }
}

/// Worker count derived from the available cores.
pub fn default_workers() -> usize {
    num_cpus::get().clamp(1, DEFAULT_MAX_WORKERS)
}
