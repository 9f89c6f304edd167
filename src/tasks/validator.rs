//! Task List Validation
//!
//! Checks loaded descriptors before any work is scheduled:
//! - The list is not empty
//! - Every url is present and uses a supported scheme
//! - Every field name is non-empty
//!
//! Duplicate (url, category) pairs are allowed but logged, since their
//! results overwrite each other in the store.

use std::collections::HashSet;

use log::{debug, info, warn};

use super::model::TaskDescriptor;

/// Url schemes the page backends understand.
pub const SUPPORTED_SCHEMES: &[&str] = &["http://", "https://", "file://", "about:"];

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyTaskList,
    EmptyUrl { index: usize },
    UnsupportedScheme { index: usize, url: String },
    EmptyFieldName { url: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTaskList => write!(f, "Task list has no entries"),
            Self::EmptyUrl { index } => write!(f, "Task #{} has an empty url", index),
            Self::UnsupportedScheme { index, url } => write!(
                f,
                "Task #{} has unsupported url '{}' (expected one of {})",
                index,
                url,
                SUPPORTED_SCHEMES.join(", ")
            ),
            Self::EmptyFieldName { url } => {
                write!(f, "Task '{}' has a selector with an empty field name", url)
            }
        }
    }
}

/// Validates a single descriptor.
fn validate_task(index: usize, task: &TaskDescriptor) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if task.url.trim().is_empty() {
        errors.push(ValidationError::EmptyUrl { index });
        return errors;
    }

    if !SUPPORTED_SCHEMES
        .iter()
        .any(|scheme| task.url.starts_with(scheme))
    {
        errors.push(ValidationError::UnsupportedScheme {
            index,
            url: task.url.clone(),
        });
    }

    if task.selectors.keys().any(|field| field.trim().is_empty()) {
        errors.push(ValidationError::EmptyFieldName {
            url: task.url.clone(),
        });
    }

    if task.selectors.is_empty() {
        debug!("Task '{}' has no selectors; result will be empty", task.url);
    }

    errors
}

/// Validates a whole task list, collecting every problem found.
pub fn validate_tasks(tasks: &[TaskDescriptor]) -> Result<(), Vec<ValidationError>> {
    info!("Validating {} tasks", tasks.len());

    if tasks.is_empty() {
        return Err(vec![ValidationError::EmptyTaskList]);
    }

    let mut errors = Vec::new();
    let mut seen_keys: HashSet<(&str, &str)> = HashSet::new();

    for (index, task) in tasks.iter().enumerate() {
        errors.extend(validate_task(index, task));

        if !seen_keys.insert(task.key()) {
            warn!(
                "Duplicate task for ({}, {}); later results overwrite earlier ones",
                task.url, task.category
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(url: &str) -> TaskDescriptor {
        TaskDescriptor::new(url, "concert", "name").with_selector("title", "h1")
    }

    #[test]
    fn test_valid_tasks() {
        let tasks = vec![
            task("https://example.com/a"),
            task("http://example.com/b"),
            task("file:///tmp/page.html"),
            task("about:blank"),
        ];
        assert!(validate_tasks(&tasks).is_ok());
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(
            validate_tasks(&[]),
            Err(vec![ValidationError::EmptyTaskList])
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let tasks = vec![
            task(""),
            task("ftp://example.com"),
            TaskDescriptor::new("https://example.com", "x", "y").with_selector(" ", "h1"),
        ];

        let errors = validate_tasks(&tasks).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0], ValidationError::EmptyUrl { index: 0 });
        assert!(matches!(
            errors[1],
            ValidationError::UnsupportedScheme { index: 1, .. }
        ));
        assert!(matches!(errors[2], ValidationError::EmptyFieldName { .. }));
    }

    #[test]
    fn test_duplicate_keys_are_not_errors() {
        let tasks = vec![task("https://example.com"), task("https://example.com")];
        assert!(validate_tasks(&tasks).is_ok());
    }

    #[test]
    fn test_error_messages() {
        let err = ValidationError::UnsupportedScheme {
            index: 3,
            url: "ftp://x".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("Task #3"));
        assert!(message.contains("ftp://x"));
        assert!(message.contains("https://"));
    }
}
