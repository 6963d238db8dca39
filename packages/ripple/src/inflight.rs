//! Inflight tracking for `Engine::settled`.
//!
//! One counter per engine:
//! - +1 when an event is accepted into the mailbox, -1 once it is dispatched
//! - +1 when a command task is spawned, -1 when it exits
//!
//! Feedback events are counted before their command task exits, so the
//! counter cannot touch zero while a chain of work is still unfolding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub(crate) struct Inflight {
    count: AtomicUsize,
    notify: Notify,
}

impl Inflight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement, waking waiters when the count hits zero.
    ///
    /// Saturates at zero so a late decrement after `clear` is harmless.
    pub fn dec(&self) {
        let prev = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if prev <= 1 {
            self.notify.notify_waiters();
        }
    }

    /// Drop all outstanding work (the engine stopped) and wake waiters.
    pub fn clear(&self) {
        self.count.store(0, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Wait until the count is zero or `cancel` fires.
    pub async fn wait_zero(&self, cancel: &CancellationToken) {
        loop {
            // Register for notification BEFORE checking the count so a
            // decrement between the check and the await is not missed.
            let notified = self.notify.notified();

            if self.count() == 0 || cancel.is_cancelled() {
                return;
            }

            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return,
            }
            // Notify is edge-triggered: loop back and recheck.
        }
    }
}

/// RAII guard that decrements on drop, even if the task is aborted.
pub(crate) struct InflightGuard {
    inflight: Arc<Inflight>,
}

impl InflightGuard {
    /// Does NOT increment: the caller already counted this unit of work.
    pub fn adopt(inflight: Arc<Inflight>) -> Self {
        Self { inflight }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight.dec();
    }
}
