//! Segment rotation timer.
//!
//! The scheduler is single-shot: each `arm` waits one period and fires once.
//! The recorder re-arms only after a rotation has been committed, so a slow
//! commit delays the next boundary instead of overlapping it.

use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct SegmentScheduler {
    pending: Option<JoinHandle<()>>,
}

impl SegmentScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `on_due` once after `period`. Replaces any pending timer.
    ///
    /// `on_due` runs on the timer task; work that must survive `cancel`
    /// should be spawned from it rather than awaited in place.
    pub fn arm<F>(&mut self, period: Duration, on_due: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        debug!("Next segment boundary in {:?}", period);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(period).await;
            on_due();
        }));
    }

    /// Drop the pending timer, if any. Safe to call when not armed.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| !pending.is_finished())
    }
}

impl Drop for SegmentScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&fired);
        (fired, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_period() {
        let mut scheduler = SegmentScheduler::new();
        let (fired, on_due) = counter();
        scheduler.arm(Duration::from_secs(300), on_due);

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing_and_is_idempotent() {
        let mut scheduler = SegmentScheduler::new();
        scheduler.cancel();

        let (fired, on_due) = counter();
        scheduler.arm(Duration::from_secs(10), on_due);
        scheduler.cancel();
        scheduler.cancel();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending_timer() {
        let mut scheduler = SegmentScheduler::new();
        let (first, on_first) = counter();
        let (second, on_second) = counter();

        scheduler.arm(Duration::from_secs(10), on_first);
        tokio::time::sleep(Duration::from_secs(5)).await;
        scheduler.arm(Duration::from_secs(10), on_second);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
