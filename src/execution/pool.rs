//! Worker Pool
//!
//! A fixed set of tokio tasks consuming one bounded queue of executors.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start--> Running --close--> (draining) --> workers exit
//!                    |
//!                    +------stop----> Stopping ----> Stopped
//! ```
//!
//! Workers own the senders of the result stream, so the stream ends exactly
//! once: when the last worker has exited and every result a worker handed
//! to a background send has been delivered. Task errors are reported through
//! [`Executor::on_error`] and never stop the pool; lifecycle errors are
//! returned to the caller.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::PoolError;

/// How one execution ended.
#[derive(Debug)]
pub enum Outcome<O, E> {
    /// Every step completed
    Done(O),
    /// Output populated up to an interruption, together with its cause
    Partial(O, E),
    /// No usable output
    Failed(E),
}

impl<O, E> Outcome<O, E> {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// The error, for partial and failed outcomes.
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Done(_) => None,
            Self::Partial(_, e) | Self::Failed(e) => Some(e),
        }
    }
}

/// A unit of work the pool can schedule.
///
/// `on_error` observes failures only: it is called with the error of a
/// partial or failed execution, with [`PoolError::TaskPanicked`] when
/// `execute` panicked, with [`PoolError::Cancelled`] when the task was
/// discarded from the queue by [`WorkerPool::stop`], and with
/// [`PoolError::ResultUndelivered`] when its output found no consumer.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    type Output: Send + 'static;
    type Error: From<PoolError> + Send + 'static;

    /// Runs the task once.
    async fn execute(&self) -> Outcome<Self::Output, Self::Error>;

    /// Observes an error of this task.
    fn on_error(&self, error: &Self::Error);
}

/// An executor as stored in the queue.
pub type BoxedExecutor<O, E> = Box<dyn Executor<Output = O, Error = E>>;

/// One item of the result stream.
#[derive(Debug)]
pub struct Completion<O, E> {
    pub output: O,
    /// Set when `output` is partial
    pub error: Option<E>,
}

impl<O, E> Completion<O, E> {
    pub fn is_partial(&self) -> bool {
        self.error.is_some()
    }
}

/// Single-consumer stream of completions. Yields `None` once every worker
/// has exited.
pub struct ResultStream<O, E> {
    rx: mpsc::Receiver<Completion<O, E>>,
}

impl<O, E> ResultStream<O, E> {
    /// Receives the next completion.
    pub async fn recv(&mut self) -> Option<Completion<O, E>> {
        self.rx.recv().await
    }
}

type SharedQueue<O, E> = Arc<tokio::sync::Mutex<mpsc::Receiver<BoxedExecutor<O, E>>>>;

enum Lifecycle<O, E> {
    Idle {
        results: mpsc::Sender<Completion<O, E>>,
    },
    Running {
        /// Taken by `close`
        submit: Option<mpsc::Sender<BoxedExecutor<O, E>>>,
        queue: SharedQueue<O, E>,
        token: CancellationToken,
        workers: Vec<JoinHandle<()>>,
    },
    Stopping,
    Stopped,
}

/// Fixed-size pool of workers.
///
/// All methods take `&self`, so the pool can be shared behind an `Arc`
/// between the submitting side and whoever stops it.
///
/// # Example
///
/// ```rust,ignore
/// let pool = WorkerPool::new(PoolConfig::new(6, tasks.len()))?;
/// let mut results = pool.results().unwrap();
///
/// pool.start(&token)?;
/// for task in tasks {
///     pool.submit(task).await?;
/// }
/// pool.close();
///
/// while let Some(completion) = results.recv().await {
///     // ...
/// }
/// pool.stop().await;
/// ```
pub struct WorkerPool<O, E> {
    config: PoolConfig,
    state: Mutex<Lifecycle<O, E>>,
    results: Mutex<Option<mpsc::Receiver<Completion<O, E>>>>,
}

impl<O, E> WorkerPool<O, E>
where
    O: Send + 'static,
    E: From<PoolError> + Send + 'static,
{
    /// Creates an idle pool.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let (results_tx, results_rx) = mpsc::channel(config.result_capacity);

        Ok(Self {
            config,
            state: Mutex::new(Lifecycle::Idle {
                results: results_tx,
            }),
            results: Mutex::new(Some(results_rx)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle<O, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), Lifecycle::Running { .. })
    }

    /// Hands out the result stream. Returns `None` after the first call.
    pub fn results(&self) -> Option<ResultStream<O, E>> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|rx| ResultStream { rx })
    }

    /// Spawns the workers.
    ///
    /// The pool token is a child of `parent`: cancelling `parent` makes the
    /// workers exit after their in-flight task.
    pub fn start(&self, parent: &CancellationToken) -> Result<(), PoolError> {
        let mut state = self.lock();
        let results = match &*state {
            Lifecycle::Idle { results } => results.clone(),
            Lifecycle::Running { .. } => return Err(PoolError::AlreadyStarted),
            Lifecycle::Stopping | Lifecycle::Stopped => return Err(PoolError::Stopped),
        };

        let (submit, queue) = mpsc::channel(self.config.queue_capacity);
        let queue: SharedQueue<O, E> = Arc::new(tokio::sync::Mutex::new(queue));
        let token = parent.child_token();

        let workers = (0..self.config.workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&queue),
                    results.clone(),
                    token.clone(),
                ))
            })
            .collect();

        // Only the workers keep result senders from here on.
        *state = Lifecycle::Running {
            submit: Some(submit),
            queue,
            token,
            workers,
        };

        info!(
            "Started worker pool: {} workers, queue capacity {}",
            self.config.workers, self.config.queue_capacity
        );
        Ok(())
    }

    /// Queues a task, waiting for space when the queue is full.
    ///
    /// Fails with [`PoolError::NotStarted`] before `start`,
    /// [`PoolError::Stopped`] after `close` or `stop`, and
    /// [`PoolError::Cancelled`] if the pool token fires while waiting.
    pub async fn submit<T>(&self, task: T) -> Result<(), PoolError>
    where
        T: Executor<Output = O, Error = E>,
    {
        let (submit, token) = {
            let state = self.lock();
            match &*state {
                Lifecycle::Idle { .. } => return Err(PoolError::NotStarted),
                Lifecycle::Running {
                    submit: Some(submit),
                    token,
                    ..
                } => (submit.clone(), token.clone()),
                _ => return Err(PoolError::Stopped),
            }
        };

        let task: BoxedExecutor<O, E> = Box::new(task);
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(PoolError::Cancelled),
            sent = submit.send(task) => sent.map_err(|_| PoolError::Stopped),
        }
    }

    /// Stops accepting tasks. Workers finish everything already queued and
    /// then exit, which ends the result stream.
    pub fn close(&self) {
        if let Lifecycle::Running { submit, .. } = &mut *self.lock() {
            if submit.take().is_some() {
                debug!("Worker pool closed to new tasks");
            }
        }
    }

    /// Cancels the pool and waits for every worker to exit.
    ///
    /// In-flight tasks run to completion; queued tasks are discarded and
    /// reported through `on_error` with [`PoolError::Cancelled`]. Calling
    /// `stop` again is a no-op.
    pub async fn stop(&self) {
        let (queue, token, workers) = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, Lifecycle::Stopping) {
                Lifecycle::Running {
                    queue,
                    token,
                    workers,
                    ..
                } => (queue, token, workers),
                Lifecycle::Idle { .. } => {
                    *state = Lifecycle::Stopped;
                    return;
                }
                other => {
                    *state = other;
                    return;
                }
            }
        };

        info!("Stopping worker pool");
        token.cancel();

        for handle in workers {
            if let Err(e) = handle.await {
                error!("Worker exited abnormally: {}", e);
            }
        }

        let mut queue = queue.lock().await;
        queue.close();
        let mut discarded = 0;
        while let Ok(task) = queue.try_recv() {
            report(task.as_ref(), &PoolError::Cancelled.into());
            discarded += 1;
        }
        if discarded > 0 {
            warn!("Discarded {} queued tasks", discarded);
        }

        *self.lock() = Lifecycle::Stopped;
        info!("Worker pool stopped");
    }
}

async fn run_worker<O, E>(
    id: usize,
    queue: SharedQueue<O, E>,
    results: mpsc::Sender<Completion<O, E>>,
    token: CancellationToken,
) where
    O: Send + 'static,
    E: From<PoolError> + Send + 'static,
{
    debug!("Worker {} started", id);

    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                task = queue.recv() => task,
            }
        };

        let Some(task) = next else {
            break;
        };

        match AssertUnwindSafe(task.execute()).catch_unwind().await {
            Ok(Outcome::Done(output)) => {
                let completion = Completion {
                    output,
                    error: None,
                };
                forward(task, &results, &token, completion).await;
            }
            Ok(Outcome::Partial(output, e)) => {
                report(task.as_ref(), &e);
                let completion = Completion {
                    output,
                    error: Some(e),
                };
                forward(task, &results, &token, completion).await;
            }
            Ok(Outcome::Failed(e)) => report(task.as_ref(), &e),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Worker {}: task panicked: {}", id, message);
                report(task.as_ref(), &PoolError::TaskPanicked(message).into());
            }
        }
    }

    debug!("Worker {} stopped", id);
}

/// Sends a completion, waiting for buffer space.
///
/// Once the pool is cancelled the worker must not wait on the consumer: a
/// completion that does not fit is moved to a background send that keeps
/// its own sender, and with it the stream, alive until delivered.
async fn forward<O, E>(
    task: BoxedExecutor<O, E>,
    results: &mpsc::Sender<Completion<O, E>>,
    token: &CancellationToken,
    completion: Completion<O, E>,
) where
    O: Send + 'static,
    E: From<PoolError> + Send + 'static,
{
    let permit = tokio::select! {
        biased;
        permit = results.reserve() => permit,
        _ = token.cancelled() => match results.try_send(completion) {
            Ok(()) => return,
            Err(TrySendError::Full(completion)) => {
                debug!("Result buffer full after cancellation; sending in background");
                let results = results.clone();
                tokio::spawn(async move {
                    match results.reserve().await {
                        Ok(permit) => permit.send(completion),
                        Err(_) => undelivered(task.as_ref()),
                    }
                });
                return;
            }
            Err(TrySendError::Closed(_)) => {
                undelivered(task.as_ref());
                return;
            }
        },
    };

    match permit {
        Ok(permit) => permit.send(completion),
        Err(_) => undelivered(task.as_ref()),
    }
}

fn undelivered<O, E>(task: &dyn Executor<Output = O, Error = E>)
where
    O: Send + 'static,
    E: From<PoolError> + Send + 'static,
{
    warn!("Result stream closed; result not delivered");
    report(task, &PoolError::ResultUndelivered.into());
}

fn report<O, E>(task: &dyn Executor<Output = O, Error = E>, error: &E)
where
    O: Send + 'static,
    E: From<PoolError> + Send + 'static,
{
    if std::panic::catch_unwind(AssertUnwindSafe(|| task.on_error(error))).is_err() {
        error!("Error handler panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
