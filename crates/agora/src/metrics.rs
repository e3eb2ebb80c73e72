//! Entity counters reported by the status operation.
//!
//! Counters are bumped by the service after a successful write, so they
//! count what this process created since start (or since the last clear),
//! without a round trip to the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metrics collector. Cloning shares the counters.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    users: AtomicU64,
    forums: AtomicU64,
    threads: AtomicU64,
    posts: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    pub user: u64,
    pub forum: u64,
    pub thread: u64,
    pub post: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_user(&self) {
        self.inner.users.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forum(&self) {
        self.inner.forums.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_thread(&self) {
        self.inner.threads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a post batch
    pub fn record_posts(&self, count: u64) {
        self.inner.posts.fetch_add(count, Ordering::Relaxed);
    }

    pub fn status(&self) -> Status {
        Status {
            user: self.inner.users.load(Ordering::Relaxed),
            forum: self.inner.forums.load(Ordering::Relaxed),
            thread: self.inner.threads.load(Ordering::Relaxed),
            post: self.inner.posts.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.inner.users.store(0, Ordering::Relaxed);
        self.inner.forums.store(0, Ordering::Relaxed);
        self.inner.threads.store(0, Ordering::Relaxed);
        self.inner.posts.store(0, Ordering::Relaxed);
    }
}
