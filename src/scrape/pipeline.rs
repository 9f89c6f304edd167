//! Extraction Pipeline
//!
//! Turns one [`TaskDescriptor`] into an [`ExtractionResult`] using a page
//! leased from the [`ResourcePool`].
//!
//! # Phases
//!
//! 1. Acquire a page (fails fast at capacity)
//! 2. Navigate, bounded by the navigation sub-deadline
//! 3. Wait for the document, bounded by the task deadline
//! 4. Query every field in descriptor order, each bounded by the query
//!    sub-deadline, reading element texts under the element sub-deadline
//! 5. Release the page
//!
//! Per-field failures are absorbed: the field gets an empty value and the
//! pipeline moves on. Only navigation and loading failures are fatal. When
//! the task deadline expires during phase 4, the fields extracted so far are
//! returned as a partial result.

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};

use super::browser::{Browser, Page};
use super::pages::ResourcePool;
use crate::config::PhaseTimeouts;
use crate::error::ScrapeError;
use crate::execution::{Deadline, Outcome};
use crate::tasks::{ExtractionResult, TaskDescriptor};

/// Separator between the texts of several matched elements.
const TEXT_SEPARATOR: &str = "\n";

/// Scrapes descriptors using pages from a shared pool.
pub struct ExtractionPipeline<B: Browser> {
    pages: Arc<ResourcePool<B>>,
    timeouts: PhaseTimeouts,
}

impl<B: Browser> ExtractionPipeline<B> {
    /// Creates a pipeline drawing pages from `pages`.
    pub fn new(pages: Arc<ResourcePool<B>>, timeouts: PhaseTimeouts) -> Self {
        Self { pages, timeouts }
    }

    /// The page pool this pipeline leases from.
    pub fn pages(&self) -> &ResourcePool<B> {
        &self.pages
    }

    /// Scrapes `descriptor` before `deadline` expires.
    ///
    /// Returns [`Outcome::Partial`] when the deadline expired during field
    /// extraction, holding the fields processed so far (possibly none), and
    /// [`Outcome::Failed`] on fatal errors or expiry before extraction began.
    pub async fn run(
        &self,
        descriptor: &TaskDescriptor,
        deadline: &Deadline,
    ) -> Outcome<ExtractionResult, ScrapeError> {
        if deadline.is_expired() {
            return Outcome::Failed(cancelled(descriptor));
        }

        let mut lease = match self.pages.acquire().await {
            Ok(lease) => lease,
            Err(e) => return Outcome::Failed(e),
        };

        let outcome = self.extract(lease.page_mut(), descriptor, deadline).await;
        self.pages.release(lease).await;
        outcome
    }

    async fn extract(
        &self,
        page: &mut B::Page,
        descriptor: &TaskDescriptor,
        deadline: &Deadline,
    ) -> Outcome<ExtractionResult, ScrapeError> {
        let url = descriptor.url.as_str();
        debug!("Navigating to {}", url);

        let navigation = deadline.child(self.timeouts.navigation);
        match navigation.bound(page.navigate(url)).await {
            Some(Ok(())) => {}
            Some(Err(source)) => {
                return Outcome::Failed(ScrapeError::Navigation {
                    url: url.to_string(),
                    source,
                })
            }
            None if deadline.is_expired() => return Outcome::Failed(cancelled(descriptor)),
            None => {
                return Outcome::Failed(ScrapeError::NavigationTimeout {
                    url: url.to_string(),
                    after: self.timeouts.navigation,
                })
            }
        }

        match deadline.bound(page.wait_ready()).await {
            Some(Ok(())) => {}
            Some(Err(source)) => {
                return Outcome::Failed(ScrapeError::Load {
                    url: url.to_string(),
                    source,
                })
            }
            None => return Outcome::Failed(cancelled(descriptor)),
        }

        let mut data = IndexMap::with_capacity(descriptor.selectors.len());

        for (field, selector) in &descriptor.selectors {
            if deadline.is_expired() {
                warn!("Scraping of {} cancelled before field '{}'", url, field);
                return interrupted(descriptor, data);
            }

            if selector.trim().is_empty() {
                data.insert(field.clone(), String::new());
                continue;
            }

            let query = deadline.child(self.timeouts.query);
            let elements = match query.bound(page.query_all(selector)).await {
                Some(Ok(elements)) => elements,
                Some(Err(e)) => {
                    warn!("Query '{}' failed on {}: {}", selector, url, e);
                    data.insert(field.clone(), String::new());
                    continue;
                }
                None if deadline.is_expired() => {
                    warn!("Scraping of {} cancelled while querying '{}'", url, selector);
                    return interrupted(descriptor, data);
                }
                None => {
                    warn!(
                        "Query '{}' on {} timed out after {:?}",
                        selector, url, self.timeouts.query
                    );
                    data.insert(field.clone(), String::new());
                    continue;
                }
            };

            if elements.is_empty() {
                warn!("No elements found for '{}' on {}", selector, url);
                data.insert(field.clone(), String::new());
                continue;
            }

            let mut texts = Vec::with_capacity(elements.len());
            for element in &elements {
                if deadline.is_expired() {
                    warn!("Scraping of {} cancelled during field '{}'", url, field);
                    return interrupted(descriptor, data);
                }

                let read = deadline.child(self.timeouts.element_text);
                match read.bound(page.text(element)).await {
                    Some(Ok(text)) => texts.push(text),
                    Some(Err(e)) => {
                        warn!("Failed to read text of '{}' on {}: {}", selector, url, e);
                    }
                    None if deadline.is_expired() => {
                        warn!("Scraping of {} cancelled during field '{}'", url, field);
                        return interrupted(descriptor, data);
                    }
                    None => {
                        warn!(
                            "Reading text of '{}' on {} timed out after {:?}",
                            selector, url, self.timeouts.element_text
                        );
                    }
                }
            }

            debug!("Field '{}' on {}: {} elements", field, url, texts.len());
            data.insert(field.clone(), texts.join(TEXT_SEPARATOR));
        }

        info!("Scraped {} ({} fields)", url, data.len());
        Outcome::Done(ExtractionResult::new(descriptor, data))
    }
}

fn cancelled(descriptor: &TaskDescriptor) -> ScrapeError {
    ScrapeError::Cancelled {
        url: descriptor.url.clone(),
    }
}

/// Result of a run cut short during field extraction.
fn interrupted(
    descriptor: &TaskDescriptor,
    data: IndexMap<String, String>,
) -> Outcome<ExtractionResult, ScrapeError> {
    Outcome::Partial(ExtractionResult::new(descriptor, data), cancelled(descriptor))
}
