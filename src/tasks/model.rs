//! Task Data Model
//!
//! Task descriptors (what to scrape) and extraction results (what was
//! scraped).
//!
//! # Example JSON Format
//!
//! ```json
//! [
//!   {
//!     "URL": "https://example.com/events/42",
//!     "Type": "concert",
//!     "Name": "Example Hall",
//!     "Selectors": {
//!       "title": "h1",
//!       "price": "span.price",
//!       "notes": ""
//!     }
//!   }
//! ]
//! ```
//!
//! Field order in `Selectors` is preserved and is the order in which fields
//! are extracted.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One unit of scraping work.
///
/// An empty selector means the field is present in the result but left
/// blank.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Target page (http, https, file or about url)
    #[serde(alias = "URL")]
    pub url: String,

    /// Category tag; together with `url` it forms the storage key
    #[serde(alias = "Type", alias = "type")]
    pub category: String,

    /// Human-readable name
    #[serde(alias = "Name", default)]
    pub name: String,

    /// Field name -> CSS selector, in extraction order
    #[serde(alias = "Selectors", default)]
    pub selectors: IndexMap<String, String>,
}

impl TaskDescriptor {
    /// Creates a descriptor with no selectors.
    ///
    /// # Example
    ///
    /// ```
    /// use pagerunner::tasks::TaskDescriptor;
    ///
    /// let task = TaskDescriptor::new("https://example.com", "concert", "Example")
    ///     .with_selector("title", "h1")
    ///     .with_selector("price", "span.price");
    /// assert_eq!(task.selectors.len(), 2);
    /// ```
    pub fn new(
        url: impl Into<String>,
        category: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into().trim().to_string(),
            category: category.into().trim().to_string(),
            name: name.into(),
            selectors: IndexMap::new(),
        }
    }

    /// Appends a field to extract.
    pub fn with_selector(mut self, field: impl Into<String>, selector: impl Into<String>) -> Self {
        self.selectors.insert(field.into(), selector.into());
        self
    }

    /// Storage key of results produced from this descriptor.
    pub fn key(&self) -> (&str, &str) {
        (&self.url, &self.category)
    }
}

/// Text extracted for one descriptor.
///
/// A result can be partial: when a run is cancelled during field
/// extraction, `data` holds only the fields processed before the
/// cancellation. Partial results always travel together with the
/// cancellation error.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub url: String,
    pub category: String,
    pub name: String,
    /// Field name -> extracted text, in descriptor order
    pub data: IndexMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// Creates a result for `descriptor` stamped with the current time.
    pub fn new(descriptor: &TaskDescriptor, data: IndexMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            url: descriptor.url.clone(),
            category: descriptor.category.clone(),
            name: descriptor.name.clone(),
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Storage key: (url, category).
    pub fn key(&self) -> (&str, &str) {
        (&self.url, &self.category)
    }

    /// Returns the extracted value of a field, if it was processed.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder_keeps_order() {
        let task = TaskDescriptor::new(" https://example.com ", "concert", "Hall")
            .with_selector("title", "h1")
            .with_selector("price", "span.price")
            .with_selector("notes", "");

        assert_eq!(task.url, "https://example.com");
        let fields: Vec<&str> = task.selectors.keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["title", "price", "notes"]);
        assert_eq!(task.key(), ("https://example.com", "concert"));
    }

    #[test]
    fn test_descriptor_accepts_original_key_style() {
        let json = r#"{
            "URL": "https://example.com/a",
            "Type": "theatre",
            "Name": "A",
            "Selectors": {"title": "h1", "date": ".date"}
        }"#;

        let task: TaskDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(task.url, "https://example.com/a");
        assert_eq!(task.category, "theatre");
        assert_eq!(task.selectors.get_index(1).unwrap().0, "date");
    }

    #[test]
    fn test_descriptor_accepts_lowercase_keys() {
        let yaml = "url: https://example.com/b\ntype: expo\nselectors:\n  title: h1\n";
        let task: TaskDescriptor = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(task.category, "expo");
        assert_eq!(task.name, "");
        assert_eq!(task.selectors.len(), 1);
    }

    #[test]
    fn test_result_copies_descriptor_identity() {
        let task = TaskDescriptor::new("https://example.com", "concert", "Hall");
        let mut data = IndexMap::new();
        data.insert("title".to_string(), "Hello".to_string());

        let result = ExtractionResult::new(&task, data);
        assert_eq!(result.key(), ("https://example.com", "concert"));
        assert_eq!(result.field("title"), Some("Hello"));
        assert_eq!(result.field("price"), None);
        assert_eq!(result.created_at, result.updated_at);
    }
}
