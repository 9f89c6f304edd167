//! Scraping Module
//!
//! Everything that touches pages: the browser capability, the bounded page
//! pool and the extraction pipeline built on both.
//!
//! # Structure
//!
//! - [`browser`]: `Browser`/`Page` traits
//! - [`html`]: static HTML backend (reqwest + scraper)
//! - [`pages`]: bounded, fail-fast page pool
//! - [`pipeline`]: per-descriptor extraction

pub mod browser;
pub mod html;
pub mod pages;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod fake;

pub use browser::{Browser, Page, BLANK_PAGE};
pub use html::{HtmlElement, HtmlPage, HttpBrowser};
pub use pages::{PageLease, ResourcePool};
pub use pipeline::ExtractionPipeline;
