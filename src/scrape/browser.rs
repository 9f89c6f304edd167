//! Browser Capability
//!
//! The narrow interface the extraction pipeline needs from a page
//! automation backend. Everything else about the backend (rendering,
//! stealth, transport) stays behind these two traits.
//!
//! Implementations:
//! - [`HttpBrowser`](super::html::HttpBrowser): static HTML over http(s) and
//!   `file://`
//! - Tests: a deterministic fake

use async_trait::async_trait;

use crate::error::BrowserError;

/// Url every page is navigated to before it is reused.
pub const BLANK_PAGE: &str = "about:blank";

/// Opens pages. Shared by every worker, so it must be `Sync`.
#[async_trait]
pub trait Browser: Send + Sync + 'static {
    type Page: Page;

    /// Opens a fresh page.
    async fn open_page(&self) -> Result<Self::Page, BrowserError>;

    /// Releases backend resources once no more pages are needed.
    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

/// One page handle. Used by a single worker at a time.
#[async_trait]
pub trait Page: Send + 'static {
    /// Handle to a matched element, valid until the next navigation.
    type Element: Send + Sync;

    /// Loads `url` into the page.
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Waits until the loaded document is ready to be queried.
    async fn wait_ready(&mut self) -> Result<(), BrowserError>;

    /// Returns every element matching `selector`, in document order.
    async fn query_all(&mut self, selector: &str) -> Result<Vec<Self::Element>, BrowserError>;

    /// Returns the visible text of `element`.
    async fn text(&mut self, element: &Self::Element) -> Result<String, BrowserError>;

    /// Returns the page to a neutral state so it can be reused.
    async fn reset(&mut self) -> Result<(), BrowserError> {
        self.navigate(BLANK_PAGE).await
    }
}
