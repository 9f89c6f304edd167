//! Scrape Run Engine
//!
//! Orchestrates one run over a list of task descriptors:
//! - Builds the page pool, extraction pipeline and worker pool
//! - Submits one task per descriptor, then closes the pool
//! - Drains the result stream into the result store
//! - Stops the pool when the run deadline expires, within a grace period
//! - Optionally samples process resources while the run is active

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::deadline::Deadline;
use super::pool::{Completion, ResultStream, WorkerPool};
use super::task::ScrapeTask;
use crate::config::{default_workers, PoolConfig, Timeouts, DEFAULT_MAX_PAGES};
use crate::error::{EngineError, PoolError, ScrapeError, StoreError};
use crate::monitoring::{ExecutionTimeline, ResourceMonitor, SharedTimeline};
use crate::scrape::{Browser, ExtractionPipeline, ResourcePool};
use crate::store::ResultStore;
use crate::tasks::{ExtractionResult, TaskDescriptor};

/// Interval for resource monitoring samples.
const MONITOR_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Counters describing a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks accepted by the worker pool
    pub submitted: usize,
    /// Tasks the pool refused
    pub rejected: usize,
    /// Results with every field extracted
    pub completed: usize,
    /// Results cut short by cancellation
    pub partial: usize,
    /// Submitted tasks that produced no result
    pub failed: usize,
    /// Results written to the store
    pub saved: usize,
    /// Workers were still busy when the shutdown grace period ran out
    pub shutdown_timed_out: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    /// True when every descriptor produced a complete result.
    pub fn is_clean(&self) -> bool {
        self.rejected == 0 && self.partial == 0 && self.failed == 0 && !self.shutdown_timed_out
    }
}

/// Scrape run engine.
///
/// # Example
///
/// ```rust,no_run
/// use pagerunner::execution::Engine;
/// use pagerunner::scrape::HttpBrowser;
/// use pagerunner::store::ResultStore;
/// use pagerunner::load_tasks;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let tasks = load_tasks("tasks.json")?;
///     let mut engine = Engine::new(tasks, HttpBrowser::new()?);
///     engine.set_workers(4);
///     engine.set_store(ResultStore::open("results.json")?);
///
///     let summary = engine.run(CancellationToken::new()).await?;
///     println!("{} results saved", summary.saved);
///     Ok(())
/// }
/// ```
pub struct Engine<B: Browser + Clone> {
    descriptors: Vec<TaskDescriptor>,
    browser: B,
    workers: usize,
    pool_config: Option<PoolConfig>,
    max_pages: usize,
    warm_pages: usize,
    timeouts: Timeouts,
    store: ResultStore,
    timeline: SharedTimeline,
    monitoring: bool,
    resource_summary: Option<String>,
}

impl<B: Browser + Clone> Engine<B> {
    /// Creates an engine for `descriptors` using pages from `browser`.
    pub fn new(descriptors: Vec<TaskDescriptor>, browser: B) -> Self {
        Self {
            descriptors,
            browser,
            workers: default_workers(),
            pool_config: None,
            max_pages: DEFAULT_MAX_PAGES,
            warm_pages: 0,
            timeouts: Timeouts::default(),
            store: ResultStore::in_memory(),
            timeline: ExecutionTimeline::shared(),
            monitoring: false,
            resource_summary: None,
        }
    }

    /// Sets the number of workers. The queue is sized to the task count.
    pub fn set_workers(&mut self, workers: usize) {
        self.workers = workers;
    }

    /// Overrides the worker pool sizing entirely.
    pub fn set_pool_config(&mut self, config: PoolConfig) {
        self.pool_config = Some(config);
    }

    /// Sets the ceiling on concurrently open pages.
    pub fn set_max_pages(&mut self, max_pages: usize) {
        self.max_pages = max_pages;
    }

    /// Opens this many pages before the first task runs.
    pub fn set_warm_pages(&mut self, count: usize) {
        self.warm_pages = count;
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) {
        self.timeouts = timeouts;
    }

    /// Sets where results are saved.
    pub fn set_store(&mut self, store: ResultStore) {
        self.store = store;
    }

    /// Enables or disables resource sampling during runs.
    pub fn set_monitoring(&mut self, enabled: bool) {
        self.monitoring = enabled;
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Timeline of the last run.
    pub fn timeline(&self) -> SharedTimeline {
        Arc::clone(&self.timeline)
    }

    /// Resource usage of the last run, if monitoring was enabled.
    pub fn resource_summary(&self) -> Option<&str> {
        self.resource_summary.as_deref()
    }

    fn pool_config(&self) -> PoolConfig {
        self.pool_config
            .unwrap_or_else(|| PoolConfig::new(self.workers, self.descriptors.len().max(1)))
    }

    /// Executes the run.
    ///
    /// Cancelling `token` (or reaching the run timeout) stops the workers;
    /// results that are already in flight are still drained and saved for
    /// up to the shutdown grace period.
    ///
    /// # Returns
    ///
    /// * `Ok(summary)` - The run finished, possibly with failed tasks
    /// * `Err` - Invalid configuration, or the store could not be written
    pub async fn run(&mut self, token: CancellationToken) -> Result<RunSummary, EngineError> {
        let started = Instant::now();
        self.timeouts.validate()?;
        let pool_config = self.pool_config();

        let pool = Arc::new(WorkerPool::<ExtractionResult, ScrapeError>::new(pool_config)?);
        let mut results = pool.results().ok_or(PoolError::Stopped)?;

        let pages = Arc::new(ResourcePool::new(self.browser.clone(), self.max_pages)?);
        if self.warm_pages > 0 {
            if let Err(e) = pages.warm(self.warm_pages).await {
                warn!("Failed to warm page pool: {}", e);
            }
        }
        let pipeline = Arc::new(ExtractionPipeline::new(
            Arc::clone(&pages),
            self.timeouts.phases,
        ));

        let run_deadline = match self.timeouts.run {
            Some(budget) => Deadline::with_budget(token.clone(), budget),
            None => Deadline::new(token.clone()),
        };

        self.timeline = ExecutionTimeline::shared();
        self.resource_summary = None;

        info!(
            "Starting run: {} tasks, {} workers, {} pages max, task timeout {:?}",
            self.descriptors.len(),
            pool_config.workers,
            pages.capacity(),
            self.timeouts.task
        );

        pool.start(&token)?;

        let monitor_token = CancellationToken::new();
        let sampler = self
            .monitoring
            .then(|| ResourceMonitor::new().spawn(monitor_token.clone(), MONITOR_SAMPLE_INTERVAL));

        let tasks: Vec<ScrapeTask<B>> = self
            .descriptors
            .iter()
            .map(|descriptor| {
                ScrapeTask::new(
                    descriptor.clone(),
                    run_deadline.clone(),
                    self.timeouts.task,
                    Arc::clone(&pipeline),
                )
                .with_timeline(Arc::clone(&self.timeline))
            })
            .collect();
        let submitter = spawn_submitter(Arc::clone(&pool), tasks);

        let mut summary = RunSummary::default();
        let drained = self
            .drain(&pool, &mut results, &run_deadline, &mut summary)
            .await;

        match submitter.await {
            Ok((submitted, rejected)) => {
                summary.submitted = submitted;
                summary.rejected = rejected;
            }
            Err(e) => error!("Task submission failed: {}", e),
        }
        summary.failed = summary
            .submitted
            .saturating_sub(summary.completed + summary.partial);

        monitor_token.cancel();
        if let Some(sampler) = sampler {
            match sampler.await {
                Ok(monitor) => self.resource_summary = Some(monitor.get_summary()),
                Err(e) => warn!("Resource monitor failed: {}", e),
            }
        }

        if summary.shutdown_timed_out {
            warn!("Leaving page pool open for workers that are still running");
        } else {
            pages.shutdown().await;
        }
        drained?;

        summary.elapsed = started.elapsed();
        info!(
            "Run finished in {:.2?}: {} completed, {} partial, {} failed, {} rejected",
            summary.elapsed, summary.completed, summary.partial, summary.failed, summary.rejected
        );
        Ok(summary)
    }

    /// Saves completions until the stream ends, the shutdown grace period
    /// runs out or a save fails. The pool is stopped on every path.
    async fn drain(
        &mut self,
        pool: &Arc<WorkerPool<ExtractionResult, ScrapeError>>,
        results: &mut ResultStream<ExtractionResult, ScrapeError>,
        run_deadline: &Deadline,
        summary: &mut RunSummary,
    ) -> Result<(), StoreError> {
        let mut stopping: Option<JoinHandle<()>> = None;
        let mut grace_deadline: Option<Instant> = None;

        let drained = loop {
            tokio::select! {
                completion = results.recv() => {
                    let Some(completion) = completion else {
                        break Ok(());
                    };
                    if let Err(e) = self.save(completion, summary) {
                        error!("Failed to save result: {}", e);
                        break Err(e);
                    }
                }
                _ = run_deadline.expired(), if stopping.is_none() => {
                    warn!("Run deadline reached; stopping workers");
                    let pool = Arc::clone(pool);
                    stopping = Some(tokio::spawn(async move { pool.stop().await }));
                    grace_deadline = Some(Instant::now() + self.timeouts.shutdown_grace);
                }
                _ = sleep_until_opt(grace_deadline), if grace_deadline.is_some() => {
                    warn!(
                        "Workers still busy after {:?}; abandoning remaining results",
                        self.timeouts.shutdown_grace
                    );
                    summary.shutdown_timed_out = true;
                    break Ok(());
                }
            }
        };

        match stopping {
            Some(handle) if !summary.shutdown_timed_out => {
                if let Err(e) = handle.await {
                    error!("Worker pool shutdown failed: {}", e);
                }
            }
            Some(_) => {}
            None => pool.stop().await,
        }
        drained
    }

    fn save(
        &mut self,
        completion: Completion<ExtractionResult, ScrapeError>,
        summary: &mut RunSummary,
    ) -> Result<(), StoreError> {
        if completion.is_partial() {
            summary.partial += 1;
        } else {
            summary.completed += 1;
        }

        let url = completion.output.url.clone();
        if completion.output.data.is_empty() && completion.is_partial() {
            warn!("Partial result for {} has no fields; not saved", url);
            return Ok(());
        }
        let id = self.store.save(completion.output)?;
        summary.saved += 1;

        match completion.error {
            Some(e) => warn!("Saved partial result {} for {} ({})", id, url, e),
            None => info!("Saved result {} for {}", id, url),
        }
        Ok(())
    }
}

/// Submits every task from a separate task so a full queue never blocks
/// the consumer of the result stream, then closes the pool.
fn spawn_submitter<B: Browser>(
    pool: Arc<WorkerPool<ExtractionResult, ScrapeError>>,
    tasks: Vec<ScrapeTask<B>>,
) -> JoinHandle<(usize, usize)> {
    tokio::spawn(async move {
        let mut submitted = 0;
        let mut rejected = 0;

        for task in tasks {
            let url = task.descriptor().url.clone();
            match pool.submit(task).await {
                Ok(()) => submitted += 1,
                Err(e) => {
                    warn!("Task {} not submitted: {}", url, e);
                    rejected += 1;
                }
            }
        }

        pool.close();
        (submitted, rejected)
    })
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
