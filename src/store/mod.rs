//! Result Storage
//!
//! - [`results`]: JSON-file result store keyed by (url, category)

pub mod results;

pub use results::{ResultStore, StoredResult};
