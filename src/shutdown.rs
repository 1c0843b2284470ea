//! Graceful shutdown coordination
//!
//! A [`ShutdownCoordinator`] is shared across stream tasks so Ctrl+C can
//! abandon in-flight polling and downloads without corrupting bookmark
//! state. Bookmarks only persist at file granularity, so a triggered
//! shutdown is observed between files, never mid-decode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a shutdown coordinator
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Coordinates graceful shutdown across async stream tasks
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new shared coordinator
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::default())
    }

    /// Request shutdown; waiters are notified exactly once
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested; returns immediately if already set
    pub async fn wait(&self) {
        if self.is_triggered() {
            return;
        }
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_is_sticky() {
        let shutdown = ShutdownCoordinator::shared();
        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        // Does not block once triggered.
        shutdown.wait().await;
    }

    #[tokio::test]
    async fn test_waiters_are_notified() {
        let shutdown = ShutdownCoordinator::shared();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };
        tokio::task::yield_now().await;
        shutdown.trigger();
        waiter.await.unwrap();
    }
}
