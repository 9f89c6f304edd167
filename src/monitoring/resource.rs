//! Resource Usage Monitoring
//!
//! Samples CPU and memory of the current process while a run is active,
//! for the summary printed at the end of a run.

use std::time::{Duration, Instant};

use log::{debug, warn};
use sysinfo::{get_current_pid, Pid, ProcessRefreshKind, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A single resource usage sample.
#[derive(Debug, Clone)]
pub struct ResourceSample {
    /// When this sample was taken
    pub timestamp: Instant,
    /// CPU usage percentage (0-100+)
    pub cpu_usage: f32,
    /// Memory usage in megabytes
    pub memory_mb: u64,
}

/// Monitors resource usage of the current process.
///
/// # Example
///
/// ```rust,ignore
/// let token = CancellationToken::new();
/// let sampler = ResourceMonitor::new().spawn(token.clone(), Duration::from_millis(500));
///
/// // ... run ...
///
/// token.cancel();
/// println!("{}", sampler.await?.get_summary());
/// ```
pub struct ResourceMonitor {
    system: System,
    process_id: Option<Pid>,
    samples: Vec<ResourceSample>,
    warmup_done: bool,
    last_sample: Option<Instant>,
    min_interval: Duration,
}

impl ResourceMonitor {
    /// Creates a new resource monitor for the current process.
    ///
    /// If the process id cannot be determined the monitor stays empty.
    pub fn new() -> Self {
        let process_id = match get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Resource monitoring disabled: {}", e);
                None
            }
        };

        Self {
            system: System::new(),
            process_id,
            samples: Vec::new(),
            warmup_done: false,
            last_sample: None,
            min_interval: Duration::from_millis(250),
        }
    }

    /// Sets the minimum interval between samples.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Takes a resource usage sample.
    ///
    /// The first call only primes CPU accounting. Subsequent calls are
    /// rate-limited by `min_interval`.
    pub fn sample(&mut self) {
        let Some(pid) = self.process_id else {
            return;
        };
        let now = Instant::now();
        let refresh_kind = ProcessRefreshKind::new().with_cpu().with_memory();

        if !self.warmup_done {
            self.system.refresh_processes_specifics(refresh_kind);
            self.warmup_done = true;
            self.last_sample = Some(now);
            return;
        }

        if let Some(last) = self.last_sample {
            if now.duration_since(last) < self.min_interval {
                return;
            }
        }

        self.system.refresh_processes_specifics(refresh_kind);
        self.last_sample = Some(now);

        if let Some(process) = self.system.process(pid) {
            self.samples.push(ResourceSample {
                timestamp: now,
                cpu_usage: process.cpu_usage(),
                memory_mb: process.memory() / (1024 * 1024),
            });
        }
    }

    /// Samples every `interval` on a background task until `token` is
    /// cancelled, then hands the monitor back.
    pub fn spawn(mut self, token: CancellationToken, interval: Duration) -> JoinHandle<Self> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => self.sample(),
                }
            }
            debug!("Resource monitor collected {} samples", self.samples.len());
            self
        })
    }

    /// Returns a human-readable summary of resource usage.
    pub fn get_summary(&self) -> String {
        if self.samples.is_empty() {
            return "No resource data collected".to_string();
        }

        let min_memory = self.samples.iter().map(|s| s.memory_mb).min().unwrap_or(0);

        format!(
            "Resource Usage:\n  Average CPU: {:.1}%\n  Peak Memory: {} MB\n  Min Memory: {} MB\n  Samples: {}",
            self.average_cpu(),
            self.peak_memory_mb(),
            min_memory,
            self.samples.len()
        )
    }

    /// Returns all collected samples.
    pub fn get_samples(&self) -> &[ResourceSample] {
        &self.samples
    }

    /// Returns the peak memory usage in MB.
    pub fn peak_memory_mb(&self) -> u64 {
        self.samples.iter().map(|s| s.memory_mb).max().unwrap_or(0)
    }

    /// Returns the average CPU usage.
    pub fn average_cpu(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.cpu_usage).sum::<f32>() / self.samples.len() as f32
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
