//! Deadline Chain
//!
//! A [`Deadline`] is a cancellation token paired with an optional expiry
//! instant. Deadlines nest: a run deadline hands out task deadlines, which
//! hand out phase deadlines. A child never outlives its parent; its expiry
//! is clamped to the parent's and it shares the parent's token, so firing
//! the run token expires every deadline derived from it.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// A cancellation token with an optional expiry instant.
#[derive(Debug, Clone)]
pub struct Deadline {
    token: CancellationToken,
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline that only ends when `token` is cancelled.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            expires_at: None,
        }
    }

    /// A deadline that ends when `token` is cancelled or `budget` elapses.
    pub fn with_budget(token: CancellationToken, budget: Duration) -> Self {
        Self::new(token).child(budget)
    }

    /// Derives a nested deadline that expires after `budget`, or earlier if
    /// this deadline expires first.
    pub fn child(&self, budget: Duration) -> Self {
        let own = Instant::now() + budget;
        let expires_at = match self.expires_at {
            Some(parent) => parent.min(own),
            None => own,
        };

        Self {
            token: self.token.clone(),
            expires_at: Some(expires_at),
        }
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The expiry instant, if any.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// True once the token is cancelled or the expiry instant has passed.
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
            || self
                .expires_at
                .map_or(false, |at| Instant::now() >= at)
    }

    /// Time left before expiry; `None` when there is no expiry instant.
    /// Returns zero once the deadline has expired.
    pub fn remaining(&self) -> Option<Duration> {
        if self.token.is_cancelled() {
            return Some(Duration::ZERO);
        }
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Resolves when the deadline expires.
    pub async fn expired(&self) {
        match self.expires_at {
            Some(at) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = sleep_until(at) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Runs `future` until it completes or the deadline expires.
    ///
    /// Returns `None` on expiry; the future is dropped at that point. When
    /// both are ready at once, the future's output wins.
    pub async fn bound<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            output = future => Some(output),
            _ = self.expired() => None,
        }
    }
}
