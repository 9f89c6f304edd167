//! Deterministic in-memory browser for tests.
//!
//! Documents are registered per url; each maps selectors to elements with
//! fixed texts and optional delays. Counters record how many pages were
//! opened, reset and used concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::browser::{Browser, Page, BLANK_PAGE};
use crate::error::BrowserError;

/// One element of a fake document.
#[derive(Debug, Clone)]
pub struct FakeElement {
    /// `None` makes text extraction fail
    pub text: Option<String>,
    pub delay: Duration,
}

impl FakeElement {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            delay: Duration::ZERO,
        }
    }

    pub fn broken() -> Self {
        Self {
            text: None,
            delay: Duration::ZERO,
        }
    }

    pub fn slow(text: &str, delay: Duration) -> Self {
        Self {
            text: Some(text.to_string()),
            delay,
        }
    }
}

/// A fake document served at one url.
#[derive(Debug, Clone, Default)]
pub struct FakeDocument {
    elements: HashMap<String, Vec<FakeElement>>,
    query_delays: HashMap<String, Duration>,
    failing_queries: Vec<String>,
    navigation_delay: Duration,
    load_delay: Duration,
    fail_navigation: bool,
}

impl FakeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers elements with the given texts under `selector`.
    pub fn with(mut self, selector: &str, texts: &[&str]) -> Self {
        let elements = texts.iter().map(|t| FakeElement::text(t)).collect();
        self.elements.insert(selector.to_string(), elements);
        self
    }

    pub fn with_elements(mut self, selector: &str, elements: Vec<FakeElement>) -> Self {
        self.elements.insert(selector.to_string(), elements);
        self
    }

    pub fn slow_query(mut self, selector: &str, delay: Duration) -> Self {
        self.query_delays.insert(selector.to_string(), delay);
        self
    }

    pub fn failing_query(mut self, selector: &str) -> Self {
        self.failing_queries.push(selector.to_string());
        self
    }

    pub fn slow_navigation(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }

    pub fn slow_load(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }
}

#[derive(Default)]
struct Shared {
    documents: Mutex<HashMap<String, FakeDocument>>,
    triggers: Mutex<Vec<(String, CancellationToken)>>,
    fail_open: AtomicBool,
    reset_delay: Mutex<Duration>,
    opened: AtomicUsize,
    closes: AtomicUsize,
    resets: AtomicUsize,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
}

/// Fake browser handing out [`FakePage`]s.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    shared: Arc<Shared>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, url: &str, document: FakeDocument) -> Self {
        self.shared
            .documents
            .lock()
            .unwrap()
            .insert(url.to_string(), document);
        self
    }

    /// Cancels `token` right after text was read from an element matched by
    /// `selector`.
    pub fn cancel_after(self, selector: &str, token: CancellationToken) -> Self {
        self.shared
            .triggers
            .lock()
            .unwrap()
            .push((selector.to_string(), token));
        self
    }

    /// Makes every page reset take `delay`.
    pub fn slow_reset(self, delay: Duration) -> Self {
        *self.shared.reset_delay.lock().unwrap() = delay;
        self
    }

    pub fn fail_open(&self, fail: bool) {
        self.shared.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// How often the browser itself was closed.
    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.shared.resets.load(Ordering::SeqCst)
    }

    /// Highest number of pages that held a document at the same time.
    pub fn peak_in_use(&self) -> usize {
        self.shared.peak_in_use.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    type Page = FakePage;

    async fn open_page(&self) -> Result<FakePage, BrowserError> {
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(BrowserError::Unavailable("browser is gone".to_string()));
        }
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakePage {
            shared: Arc::clone(&self.shared),
            document: None,
        })
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Page of a [`FakeBrowser`].
pub struct FakePage {
    shared: Arc<Shared>,
    document: Option<FakeDocument>,
}

/// Element handle of a [`FakePage`].
#[derive(Debug, Clone)]
pub struct FakeHandle {
    selector: String,
    element: FakeElement,
}

impl FakePage {
    fn set_document(&mut self, document: Option<FakeDocument>) {
        let was_loaded = self.document.is_some();
        let loaded = document.is_some();
        self.document = document;

        if loaded && !was_loaded {
            let now = self.shared.in_use.fetch_add(1, Ordering::SeqCst) + 1;
            self.shared.peak_in_use.fetch_max(now, Ordering::SeqCst);
        } else if !loaded && was_loaded {
            self.shared.in_use.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakePage {
    fn drop(&mut self) {
        self.set_document(None);
    }
}

#[async_trait]
impl Page for FakePage {
    type Element = FakeHandle;

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        if url == BLANK_PAGE {
            self.set_document(None);
            return Ok(());
        }

        let document = self.shared.documents.lock().unwrap().get(url).cloned();
        let document = document.ok_or_else(|| BrowserError::Http {
            status: 404,
            url: url.to_string(),
        })?;

        tokio::time::sleep(document.navigation_delay).await;
        if document.fail_navigation {
            return Err(BrowserError::Other("connection refused".to_string()));
        }
        self.set_document(Some(document));
        Ok(())
    }

    async fn wait_ready(&mut self) -> Result<(), BrowserError> {
        let delay = self
            .document
            .as_ref()
            .ok_or(BrowserError::NotLoaded)?
            .load_delay;
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<FakeHandle>, BrowserError> {
        let document = self.document.as_ref().ok_or(BrowserError::NotLoaded)?;
        let delay = document.query_delays.get(selector).copied();
        let failing = document.failing_queries.iter().any(|s| s == selector);
        let handles: Vec<FakeHandle> = document
            .elements
            .get(selector)
            .map(|elements| {
                elements
                    .iter()
                    .map(|element| FakeHandle {
                        selector: selector.to_string(),
                        element: element.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(BrowserError::InvalidSelector {
                selector: selector.to_string(),
                reason: "rejected by fake".to_string(),
            });
        }
        Ok(handles)
    }

    async fn text(&mut self, handle: &FakeHandle) -> Result<String, BrowserError> {
        tokio::time::sleep(handle.element.delay).await;
        let text = handle
            .element
            .text
            .clone()
            .ok_or_else(|| BrowserError::Other("element detached".to_string()))?;

        for (selector, token) in self.shared.triggers.lock().unwrap().iter() {
            if *selector == handle.selector {
                token.cancel();
            }
        }
        Ok(text)
    }

    async fn reset(&mut self) -> Result<(), BrowserError> {
        self.shared.resets.fetch_add(1, Ordering::SeqCst);
        let delay = *self.shared.reset_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.navigate(BLANK_PAGE).await
    }
}
