//! Page Pool
//!
//! A bounded pool of reusable pages with fail-fast acquisition. When every
//! slot is taken, [`ResourcePool::acquire`] returns
//! [`ScrapeError::Capacity`] immediately instead of waiting, so congestion
//! surfaces at the task that asked rather than as hidden latency.
//!
//! The free list and the active count live in one struct behind one mutex.
//! The lock is never held across an `.await`: opening and resetting pages
//! happen outside it, after a slot has been reserved.
//!
//! After [`ResourcePool::shutdown`] the pool hands out no more pages, and
//! pages released late are closed instead of kept.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};

use super::browser::{Browser, Page};
use crate::error::{BrowserError, ConfigError, ScrapeError};

/// Upper bound on resetting a page during release.
const RESET_TIMEOUT: Duration = Duration::from_secs(5);

struct PoolState<P> {
    free: Vec<P>,
    active: usize,
    closed: bool,
}

/// Bounded pool of pages opened from one [`Browser`].
///
/// # Example
///
/// ```rust,ignore
/// let pages = ResourcePool::new(HttpBrowser::new()?, 10)?;
///
/// let mut lease = pages.acquire().await?;
/// lease.page_mut().navigate("https://example.com").await?;
/// pages.release(lease).await;
/// ```
pub struct ResourcePool<B: Browser> {
    browser: B,
    max_pages: usize,
    state: Mutex<PoolState<B::Page>>,
}

impl<B: Browser> ResourcePool<B> {
    /// Creates an empty pool allowing at most `max_pages` active pages.
    pub fn new(browser: B, max_pages: usize) -> Result<Self, ConfigError> {
        if max_pages == 0 {
            return Err(ConfigError::ZeroSize {
                name: "max_pages",
                value: max_pages,
            });
        }

        Ok(Self {
            browser,
            max_pages,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                active: 0,
                closed: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<B::Page>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of concurrently active pages.
    pub fn capacity(&self) -> usize {
        self.max_pages
    }

    /// Number of pages currently leased out.
    pub fn active(&self) -> usize {
        self.lock().active
    }

    /// Number of opened pages waiting for reuse.
    pub fn idle(&self) -> usize {
        self.lock().free.len()
    }

    /// Opens pages ahead of time until `count` pages (capped at the
    /// ceiling) sit in the free list. Returns how many pages were opened.
    pub async fn warm(&self, count: usize) -> Result<usize, ScrapeError> {
        let target = count.min(self.max_pages);
        let mut opened = 0;

        while self.idle() + self.active() < target {
            let page = self
                .browser
                .open_page()
                .await
                .map_err(ScrapeError::PageUnavailable)?;
            let mut state = self.lock();
            if state.closed {
                break;
            }
            state.free.push(page);
            opened += 1;
        }

        debug!("Warmed page pool with {} pages", opened);
        Ok(opened)
    }

    /// Leases a page.
    ///
    /// Reuses a free page when one exists, otherwise opens a new one.
    /// Fails immediately with [`ScrapeError::Capacity`] at the ceiling and
    /// with [`ScrapeError::PageUnavailable`] when a page cannot be opened.
    pub async fn acquire(&self) -> Result<PageLease<'_, B>, ScrapeError> {
        let recycled = {
            let mut state = self.lock();
            if state.closed {
                return Err(ScrapeError::PageUnavailable(BrowserError::Other(
                    "page pool is shut down".to_string(),
                )));
            }
            if state.active >= self.max_pages {
                return Err(ScrapeError::Capacity {
                    max: self.max_pages,
                });
            }
            state.active += 1;
            state.free.pop()
        };

        // The slot is given back if the open below fails or is abandoned.
        let mut slot = Slot {
            pool: self,
            held: true,
            leased: false,
        };

        let page = match recycled {
            Some(page) => page,
            None => {
                debug!("Opening new page ({} of {})", self.active(), self.max_pages);
                self.browser
                    .open_page()
                    .await
                    .map_err(ScrapeError::PageUnavailable)?
            }
        };

        slot.leased = true;
        Ok(PageLease { slot, page })
    }

    /// Resets the leased page and returns it to the free list.
    ///
    /// A page that fails to reset in time is discarded; its slot is freed
    /// either way.
    pub async fn release(&self, lease: PageLease<'_, B>) {
        let PageLease { mut slot, mut page } = lease;

        let reusable = match tokio::time::timeout(RESET_TIMEOUT, page.reset()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Discarding page that failed to reset: {}", e);
                false
            }
            Err(_) => {
                warn!("Discarding page that did not reset within {:?}", RESET_TIMEOUT);
                false
            }
        };

        let mut state = self.lock();
        if reusable && !state.closed {
            state.free.push(page);
        }
        state.active -= 1;
        slot.held = false;
    }

    /// Drops every free page and closes the browser. Leases still out are
    /// discarded when released.
    pub async fn shutdown(&self) {
        let free = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.free)
        };
        debug!("Closing {} idle pages", free.len());
        drop(free);

        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
    }
}

/// One reserved unit of the page ceiling. Frees itself on drop unless
/// the pool already accounted for it.
struct Slot<'a, B: Browser> {
    pool: &'a ResourcePool<B>,
    held: bool,
    leased: bool,
}

impl<B: Browser> Drop for Slot<'_, B> {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        if self.leased {
            warn!("Page lease dropped without release; discarding page");
        }
        self.pool.lock().active -= 1;
    }
}

/// Exclusive use of one page until it is handed back with
/// [`ResourcePool::release`].
///
/// Dropping a lease without releasing it discards the page and frees the
/// slot.
pub struct PageLease<'a, B: Browser> {
    slot: Slot<'a, B>,
    page: B::Page,
}

impl<B: Browser> PageLease<'_, B> {
    /// The leased page.
    pub fn page_mut(&mut self) -> &mut B::Page {
        &mut self.page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::fake::{FakeBrowser, FakeDocument};
    use std::sync::Arc;

    const URL: &str = "https://example.com";

    fn browser() -> FakeBrowser {
        FakeBrowser::new().with_document(URL, FakeDocument::new().with("h1", &["Hello"]))
    }

    #[tokio::test]
    async fn test_second_acquire_at_ceiling_fails_immediately() {
        let pool = ResourcePool::new(browser(), 1).unwrap();

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await;

        assert!(matches!(second, Err(ScrapeError::Capacity { max: 1 })));
        assert_eq!(pool.active(), 1);

        pool.release(first).await;
        assert_eq!(pool.active(), 0);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_rejects_without_blocking() {
        let pool = Arc::new(ResourcePool::new(browser(), 1).unwrap());

        let (a, b) = tokio::join!(pool.acquire(), pool.acquire());
        let failures = [a.is_err(), b.is_err()].iter().filter(|f| **f).count();
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_release_resets_and_reuses_page() {
        let fake = browser();
        let pool = ResourcePool::new(fake.clone(), 2).unwrap();

        let mut lease = pool.acquire().await.unwrap();
        lease.page_mut().navigate(URL).await.unwrap();
        pool.release(lease).await;

        assert_eq!(fake.resets(), 1);
        assert_eq!(pool.idle(), 1);

        let lease = pool.acquire().await.unwrap();
        assert_eq!(fake.opened(), 1, "free page should be reused");
        pool.release(lease).await;
    }

    #[tokio::test]
    async fn test_open_failure_surfaces_and_frees_slot() {
        let fake = browser();
        fake.fail_open(true);
        let pool = ResourcePool::new(fake.clone(), 1).unwrap();

        let result = pool.acquire().await;
        assert!(matches!(result, Err(ScrapeError::PageUnavailable(_))));
        assert_eq!(pool.active(), 0);

        fake.fail_open(false);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_lease_frees_slot() {
        let pool = ResourcePool::new(browser(), 1).unwrap();

        let lease = pool.acquire().await.unwrap();
        drop(lease);

        assert_eq!(pool.active(), 0);
        assert_eq!(pool.idle(), 0, "abandoned page is not reused");
    }

    #[tokio::test]
    async fn test_warm_opens_up_to_ceiling() {
        let fake = browser();
        let pool = ResourcePool::new(fake.clone(), 3).unwrap();

        assert_eq!(pool.warm(5).await.unwrap(), 3);
        assert_eq!(pool.idle(), 3);
        assert_eq!(fake.opened(), 3);

        let lease = pool.acquire().await.unwrap();
        assert_eq!(fake.opened(), 3);
        pool.release(lease).await;

        pool.shutdown().await;
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_zero_ceiling_is_rejected() {
        let result = ResourcePool::new(browser(), 0);
        assert!(matches!(
            result,
            Err(ConfigError::ZeroSize {
                name: "max_pages",
                value: 0
            })
        ));
    }

    #[tokio::test]
    async fn test_release_after_shutdown_discards_page() {
        let pool = ResourcePool::new(browser(), 2).unwrap();

        let lease = pool.acquire().await.unwrap();
        pool.shutdown().await;
        pool.release(lease).await;

        assert_eq!(pool.active(), 0);
        assert_eq!(pool.idle(), 0);
        assert!(matches!(
            pool.acquire().await,
            Err(ScrapeError::PageUnavailable(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_active_pages_never_exceed_ceiling() {
        const CEILING: usize = 3;
        let fake = browser();
        let pool = Arc::new(ResourcePool::new(fake.clone(), CEILING).unwrap());

        let mut handles = Vec::new();
        for i in 0..40u64 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                let hold = Duration::from_millis((i * 7) % 11);
                match pool.acquire().await {
                    Ok(mut lease) => {
                        assert!(pool.active() <= CEILING);
                        lease.page_mut().navigate(URL).await.unwrap();
                        tokio::time::sleep(hold).await;
                        pool.release(lease).await;
                        true
                    }
                    Err(ScrapeError::Capacity { .. }) => false,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }));
        }

        let mut acquired = 0;
        for handle in handles {
            if handle.await.unwrap() {
                acquired += 1;
            }
        }

        assert!(acquired >= 1);
        assert!(fake.peak_in_use() <= CEILING);
        assert!(fake.opened() <= CEILING);
        assert_eq!(pool.active(), 0);
    }
}
