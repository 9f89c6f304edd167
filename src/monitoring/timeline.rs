//! Execution Timeline
//!
//! Records when each scrape task starts and how it ends, for per-task
//! durations and an ASCII Gantt chart at the end of a run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Timeline shared between concurrently running tasks.
pub type SharedTimeline = Arc<Mutex<ExecutionTimeline>>;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Task picked up by a worker
    Started,
    /// Every field extracted
    Completed,
    /// Cut short, some fields extracted
    Partial,
    /// No result
    Failed,
}

impl EventType {
    fn is_terminal(self) -> bool {
        !matches!(self, EventType::Started)
    }

    fn symbol(self) -> char {
        match self {
            EventType::Started | EventType::Completed => '#',
            EventType::Partial => '~',
            EventType::Failed => 'x',
        }
    }
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Task the event belongs to (its url)
    pub task: String,
    /// Type of event
    pub event_type: EventType,
    /// When the event occurred
    pub timestamp: Instant,
}

/// Tracks the execution timeline of a run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Creates a timeline that can be handed to several tasks.
    pub fn shared() -> SharedTimeline {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Records an event for a task.
    pub fn add_event(&mut self, task: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            task: task.into(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Number of tasks whose last event is `event_type`.
    pub fn count(&self, event_type: EventType) -> usize {
        let mut last: HashMap<&str, EventType> = HashMap::new();
        for event in &self.events {
            last.insert(&event.task, event.event_type);
        }
        last.values().filter(|t| **t == event_type).count()
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Start and end offsets (ms) plus final state per finished task,
    /// sorted by start.
    fn spans(&self) -> Vec<(String, u128, u128, EventType)> {
        let mut starts: HashMap<&str, u128> = HashMap::new();
        let mut spans = Vec::new();

        for event in &self.events {
            let elapsed = event.timestamp.duration_since(self.start_time).as_millis();

            if event.event_type.is_terminal() {
                if let Some(start) = starts.remove(event.task.as_str()) {
                    spans.push((event.task.clone(), start, elapsed, event.event_type));
                }
            } else {
                starts.insert(&event.task, elapsed);
            }
        }

        spans.sort_by_key(|(_, start, _, _)| *start);
        spans
    }

    /// Generates an ASCII Gantt chart representation.
    ///
    /// Completed tasks are drawn with `#`, partial ones with `~` and failed
    /// ones with `x`.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self.elapsed().as_millis();

        if total_time == 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;

        for (task, start, end, event_type) in self.spans() {
            let start_pos = (start as f64 * scale) as usize;
            let width = ((end - start) as f64 * scale).max(1.0) as usize;

            let mut bar = " ".repeat(start_pos);
            bar.extend(std::iter::repeat(event_type.symbol()).take(width));

            output.push_str(&format!(
                "{:24} |{:50}| ({} ms)\n",
                truncate(&task, 24),
                bar,
                end - start
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }

    /// Returns task durations in milliseconds.
    pub fn get_durations(&self) -> HashMap<String, u128> {
        self.spans()
            .into_iter()
            .map(|(task, start, end, _)| (task, end - start))
            .collect()
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or shortens a label to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        // Keep the tail: urls differ at the end more often than at the start.
        let tail: String = s.chars().skip(count - (max_len - 3)).collect();
        format!("...{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timeline_creation() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.events.is_empty());
    }

    #[test]
    fn test_get_durations() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("https://a.example", EventType::Started);
        thread::sleep(Duration::from_millis(50));
        timeline.add_event("https://a.example", EventType::Completed);

        let durations = timeline.get_durations();
        assert!(*durations.get("https://a.example").unwrap() >= 50);
    }

    #[test]
    fn test_get_durations_only_started() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("https://a.example", EventType::Started);

        assert!(timeline.get_durations().is_empty());
    }

    #[test]
    fn test_count_uses_last_event_per_task() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("a", EventType::Started);
        timeline.add_event("b", EventType::Started);
        timeline.add_event("c", EventType::Started);
        timeline.add_event("a", EventType::Completed);
        timeline.add_event("b", EventType::Partial);
        timeline.add_event("c", EventType::Failed);

        assert_eq!(timeline.count(EventType::Completed), 1);
        assert_eq!(timeline.count(EventType::Partial), 1);
        assert_eq!(timeline.count(EventType::Failed), 1);
        assert_eq!(timeline.count(EventType::Started), 0);
    }

    #[test]
    fn test_gantt_chart_generation() {
        let mut timeline = ExecutionTimeline::new();

        timeline.add_event("https://a.example", EventType::Started);
        thread::sleep(Duration::from_millis(30));
        timeline.add_event("https://a.example", EventType::Completed);

        timeline.add_event("https://b.example", EventType::Started);
        thread::sleep(Duration::from_millis(30));
        timeline.add_event("https://b.example", EventType::Failed);

        let chart = timeline.gantt_chart();
        assert!(chart.contains("https://a.example"));
        assert!(chart.contains("https://b.example"));
        assert!(chart.contains('x'));
        assert!(chart.contains("Total:"));
    }

    #[test]
    fn test_gantt_chart_empty() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.gantt_chart().contains("Timeline"));
    }

    #[test]
    fn test_shared_timeline_across_threads() {
        let timeline = ExecutionTimeline::shared();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let timeline = Arc::clone(&timeline);
                thread::spawn(move || {
                    let task = format!("task-{}", i);
                    timeline.lock().unwrap().add_event(task.clone(), EventType::Started);
                    timeline.lock().unwrap().add_event(task, EventType::Completed);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let timeline = timeline.lock().unwrap();
        assert_eq!(timeline.get_events().len(), 8);
        assert_eq!(timeline.count(EventType::Completed), 4);
    }

    #[test]
    fn test_truncate_keeps_tail_of_long_labels() {
        let label = truncate("https://example.com/events/2024/concert", 12);
        assert_eq!(label.chars().count(), 12);
        assert!(label.starts_with("..."));
        assert!(label.ends_with("concert"));
    }
}
