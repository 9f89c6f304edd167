//! Run Monitoring Module
//!
//! Utilities for tracking process resource usage and the timeline of
//! scrape tasks during a run.
//!
//! # Components
//!
//! - [`ResourceMonitor`]: CPU and memory usage sampling
//! - [`ExecutionTimeline`]: Task start/end timing for Gantt charts

pub mod resource;
pub mod timeline;

pub use resource::{ResourceMonitor, ResourceSample};
pub use timeline::{EventType, ExecutionTimeline, SharedTimeline, TimelineEvent};
