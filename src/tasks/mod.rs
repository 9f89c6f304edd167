//! Task Definition Module
//!
//! Data structures and utilities for describing scraping work and the
//! results it produces.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (TaskDescriptor, ExtractionResult)
//! - [`loader`]: JSON/YAML task file loading
//! - [`validator`]: Validation rules for task lists

pub mod loader;
pub mod model;
pub mod validator;

pub use loader::{load_tasks, parse_tasks, TaskFormat};
pub use model::{ExtractionResult, TaskDescriptor};
pub use validator::{validate_tasks, ValidationError};
