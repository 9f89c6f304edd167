//! Task File Loader
//!
//! Reads task descriptors from a JSON or YAML file. Files ending in
//! `.yaml`/`.yml` are parsed as YAML, everything else as JSON.

use std::fs;
use std::path::Path;

use log::{debug, info};

use super::model::TaskDescriptor;
use super::validator::validate_tasks;
use crate::error::LoadError;

/// Supported task file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFormat {
    Json,
    Yaml,
}

impl TaskFormat {
    /// Picks the format from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

/// Parses a task list from text.
pub fn parse_tasks(content: &str, format: TaskFormat) -> Result<Vec<TaskDescriptor>, LoadError> {
    let tasks: Vec<TaskDescriptor> = match format {
        TaskFormat::Json => serde_json::from_str(content)?,
        TaskFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_tasks(&tasks).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        LoadError::Invalid(messages.join("\n"))
    })?;

    Ok(tasks)
}

/// Loads and validates a task list from a file.
///
/// # Example
///
/// ```rust,no_run
/// use pagerunner::tasks::load_tasks;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let tasks = load_tasks("tasks.json")?;
///     println!("Loaded {} tasks", tasks.len());
///     Ok(())
/// }
/// ```
pub fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<TaskDescriptor>, LoadError> {
    let path = path.as_ref();
    info!("Loading tasks from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;

    debug!("Task file loaded ({} bytes)", content.len());

    let tasks = parse_tasks(&content, TaskFormat::from_path(path))?;
    info!("Loaded {} tasks", tasks.len());
    Ok(tasks)
}
