//! Broadcast primitives for state and effects.
//!
//! # Guarantees
//!
//! | Channel | Replay | Gaps | Buffering |
//! |---------|--------|------|-----------|
//! | [`StateChannel`] | current value on subscribe | never | unbounded per subscriber |
//! | [`EffectBus`] | none | never | unbounded per subscriber |
//!
//! State is a fold: a subscriber that misses a commit would see a history
//! that never happened, so every commit is queued for every subscriber.
//! Effects are one-shot notifications: subscribers only see what was emitted
//! while they were listening, but they see all of it. Neither channel makes
//! the writer wait for a slow reader.

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

// =============================================================================
// State Channel
// =============================================================================

/// Latest-value broadcaster for the engine's state.
///
/// Reads of the current value are lock-free. The subscriber list is guarded
/// by a mutex that is also held across each commit, so a new subscriber
/// observes either the value before a commit (and then the commit) or the
/// value after it, never both and never neither.
pub(crate) struct StateChannel<S> {
    current: ArcSwap<S>,
    /// `None` once closed.
    subscribers: Mutex<Option<Vec<mpsc::UnboundedSender<S>>>>,
}

impl<S: Clone + Send + Sync + 'static> StateChannel<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            subscribers: Mutex::new(Some(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Vec<mpsc::UnboundedSender<S>>>> {
        // Senders are plain handles; a poisoned list is still consistent.
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The most recently committed value.
    pub fn current(&self) -> Arc<S> {
        self.current.load_full()
    }

    /// Replace the current value and fan it out to every subscriber.
    ///
    /// Subscribers whose receiving half has been dropped are pruned.
    pub fn commit(&self, next: S) {
        let next = Arc::new(next);
        let mut subscribers = self.lock();
        self.current.store(next.clone());
        if let Some(list) = subscribers.as_mut() {
            list.retain(|tx| tx.send(S::clone(&next)).is_ok());
        }
    }

    /// Subscribe: the current value is queued first, then every later commit.
    pub fn subscribe(&self) -> StateSubscription<S> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.lock();
        let current = S::clone(&self.current.load());
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(current);
        if let Some(list) = subscribers.as_mut() {
            list.push(tx);
        }
        StateSubscription { rx }
    }

    /// Stop accepting subscribers and end every existing subscription once
    /// its queued values are drained. The current value stays readable.
    pub fn close(&self) {
        self.lock().take();
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().as_ref().map(Vec::len).unwrap_or(0)
    }
}

impl<S> fmt::Debug for StateChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateChannel").finish_non_exhaustive()
    }
}

/// A subscription to an engine's state.
///
/// Yields the value current at subscription time, then every committed value
/// in commit order. Ends after the engine stops and the queue is drained.
pub struct StateSubscription<S> {
    rx: mpsc::UnboundedReceiver<S>,
}

impl<S: Send + 'static> StateSubscription<S> {
    /// Receive the next state, or `None` once the engine has stopped.
    pub async fn recv(&mut self) -> Option<S> {
        self.rx.recv().await
    }

    /// Take an already queued state without waiting.
    pub fn try_recv(&mut self) -> Option<S> {
        self.rx.try_recv().ok()
    }
}

impl<S> Stream for StateSubscription<S> {
    type Item = S;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S>> {
        self.rx.poll_recv(cx)
    }
}

impl<S> fmt::Debug for StateSubscription<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSubscription").finish_non_exhaustive()
    }
}

// =============================================================================
// Effect Bus
// =============================================================================

/// No-replay broadcaster for effects.
///
/// Every subscriber registered when an effect is published gets its own
/// copy, queued until it is read. Effects published with no subscribers are
/// dropped on the floor.
pub(crate) struct EffectBus<F> {
    /// `None` once closed.
    subscribers: Mutex<Option<Vec<mpsc::UnboundedSender<F>>>>,
}

impl<F: Clone + Send + 'static> EffectBus<F> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Some(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Vec<mpsc::UnboundedSender<F>>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish to the current subscribers.
    ///
    /// Returns the number of subscribers that will receive the effect.
    /// Subscribers whose receiving half has been dropped are pruned.
    pub fn publish(&self, effect: F) -> usize {
        let mut subscribers = self.lock();
        match subscribers.as_mut() {
            Some(list) => {
                list.retain(|tx| tx.send(effect.clone()).is_ok());
                list.len()
            }
            None => 0,
        }
    }

    /// Subscribe to effects published from now on.
    pub fn subscribe(&self) -> EffectSubscription<F> {
        let (tx, rx) = mpsc::unbounded_channel();
        // When closed the sender is dropped here and the subscription ends at once.
        if let Some(list) = self.lock().as_mut() {
            list.push(tx);
        }
        EffectSubscription { rx }
    }

    /// End every subscription once its queued effects are drained.
    /// Later publishes are dropped.
    pub fn close(&self) {
        self.lock().take();
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().as_ref().map(Vec::len).unwrap_or(0)
    }
}

impl<F> fmt::Debug for EffectBus<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectBus").finish_non_exhaustive()
    }
}

/// A subscription to an engine's effects.
///
/// Only effects published after the subscription was created are received,
/// all of them and in publication order.
pub struct EffectSubscription<F> {
    rx: mpsc::UnboundedReceiver<F>,
}

impl<F: Send + 'static> EffectSubscription<F> {
    /// Receive the next effect, or `None` once the engine has stopped and
    /// every queued effect has been read.
    pub async fn recv(&mut self) -> Option<F> {
        self.rx.recv().await
    }

    /// Take an already published effect without waiting.
    pub fn try_recv(&mut self) -> Option<F> {
        self.rx.try_recv().ok()
    }

    /// Convert into a boxable, `Unpin` stream.
    pub fn into_stream(self) -> impl Stream<Item = F> + Send + Unpin {
        UnboundedReceiverStream::new(self.rx)
    }
}

impl<F> Stream for EffectSubscription<F> {
    type Item = F;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<F>> {
        self.rx.poll_recv(cx)
    }
}

impl<F> fmt::Debug for EffectSubscription<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectSubscription").finish_non_exhaustive()
    }
}
