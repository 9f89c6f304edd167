//! Scrape Task
//!
//! Binds one descriptor to the extraction pipeline so the worker pool can
//! schedule it. The task budget starts when a worker picks the task up, not
//! when it is submitted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, warn};

use super::deadline::Deadline;
use super::pool::{Executor, Outcome};
use crate::error::{PoolError, ScrapeError};
use crate::monitoring::{EventType, SharedTimeline};
use crate::scrape::{Browser, ExtractionPipeline};
use crate::tasks::{ExtractionResult, TaskDescriptor};

/// One scheduled scrape of one descriptor.
pub struct ScrapeTask<B: Browser> {
    descriptor: TaskDescriptor,
    run: Deadline,
    budget: Duration,
    pipeline: Arc<ExtractionPipeline<B>>,
    timeline: Option<SharedTimeline>,
}

impl<B: Browser> ScrapeTask<B> {
    /// Creates a task that scrapes `descriptor` within `budget`, and never
    /// past the `run` deadline.
    pub fn new(
        descriptor: TaskDescriptor,
        run: Deadline,
        budget: Duration,
        pipeline: Arc<ExtractionPipeline<B>>,
    ) -> Self {
        Self {
            descriptor,
            run,
            budget,
            pipeline,
            timeline: None,
        }
    }

    /// Records start and end of this task in `timeline`.
    pub fn with_timeline(mut self, timeline: SharedTimeline) -> Self {
        self.timeline = Some(timeline);
        self
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    fn record(&self, event_type: EventType) {
        if let Some(timeline) = &self.timeline {
            if let Ok(mut timeline) = timeline.lock() {
                timeline.add_event(self.descriptor.url.clone(), event_type);
            }
        }
    }
}

#[async_trait]
impl<B: Browser> Executor for ScrapeTask<B> {
    type Output = ExtractionResult;
    type Error = ScrapeError;

    async fn execute(&self) -> Outcome<ExtractionResult, ScrapeError> {
        self.record(EventType::Started);

        let deadline = self.run.child(self.budget);
        let outcome = self.pipeline.run(&self.descriptor, &deadline).await;

        self.record(match &outcome {
            Outcome::Done(_) => EventType::Completed,
            Outcome::Partial(..) => EventType::Partial,
            Outcome::Failed(_) => EventType::Failed,
        });
        outcome
    }

    fn on_error(&self, error: &ScrapeError) {
        if error.is_cancellation() {
            warn!("Task {} cancelled: {}", self.descriptor.url, error);
        } else {
            error!("Task {} failed: {}", self.descriptor.url, error);
        }

        // Discarded or panicked tasks never reached the end of `execute`.
        if matches!(
            error,
            ScrapeError::Pool(PoolError::Cancelled | PoolError::TaskPanicked(_))
        ) {
            self.record(EventType::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhaseTimeouts;
    use crate::error::PoolError;
    use crate::monitoring::ExecutionTimeline;
    use crate::scrape::fake::{FakeBrowser, FakeDocument};
    use crate::scrape::ResourcePool;
    use tokio_util::sync::CancellationToken;

    const URL: &str = "https://example.com";

    fn pipeline(document: FakeDocument) -> Arc<ExtractionPipeline<FakeBrowser>> {
        let browser = FakeBrowser::new().with_document(URL, document);
        let pages = Arc::new(ResourcePool::new(browser, 2).unwrap());
        Arc::new(ExtractionPipeline::new(pages, PhaseTimeouts::default()))
    }

    fn descriptor() -> TaskDescriptor {
        TaskDescriptor::new(URL, "concert", "Example").with_selector("title", "h1")
    }

    #[tokio::test]
    async fn test_execute_records_timeline() {
        let timeline = ExecutionTimeline::shared();
        let task = ScrapeTask::new(
            descriptor(),
            Deadline::new(CancellationToken::new()),
            Duration::from_secs(30),
            pipeline(FakeDocument::new().with("h1", &["Hello"])),
        )
        .with_timeline(Arc::clone(&timeline));

        match task.execute().await {
            Outcome::Done(result) => assert_eq!(result.field("title"), Some("Hello")),
            other => panic!("expected Done, got {:?}", other),
        }

        let timeline = timeline.lock().unwrap();
        assert_eq!(timeline.get_events().len(), 2);
        assert_eq!(timeline.count(EventType::Completed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_starts_at_execution() {
        let task = ScrapeTask::new(
            descriptor(),
            Deadline::new(CancellationToken::new()),
            Duration::from_secs(30),
            pipeline(
                FakeDocument::new()
                    .with("h1", &["Hello"])
                    .slow_load(Duration::from_secs(10)),
            ),
        );

        // Longer than the budget, spent waiting in the queue.
        tokio::time::sleep(Duration::from_secs(45)).await;

        assert!(task.execute().await.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_expiry_cancels_task() {
        let task = ScrapeTask::new(
            descriptor(),
            Deadline::new(CancellationToken::new()),
            Duration::from_secs(30),
            pipeline(
                FakeDocument::new()
                    .with("h1", &["Hello"])
                    .slow_load(Duration::from_secs(40)),
            ),
        );

        match task.execute().await {
            Outcome::Failed(error) => assert!(error.is_cancellation()),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_on_error_records_discarded_task() {
        let timeline = ExecutionTimeline::shared();
        let task = ScrapeTask::new(
            descriptor(),
            Deadline::new(CancellationToken::new()),
            Duration::from_secs(30),
            pipeline(FakeDocument::new()),
        )
        .with_timeline(Arc::clone(&timeline));

        task.on_error(&PoolError::Cancelled.into());

        assert_eq!(timeline.lock().unwrap().count(EventType::Failed), 1);
    }
}
