//! Testing utilities for ripple engines.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! ripple = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Recording Listener
//!
//! ```ignore
//! use ripple::testing::{Hook, RecordingListener};
//!
//! let recorder = RecordingListener::new();
//! let engine = EngineBuilder::new(Cart::default(), CartReducer)
//!     .with_listener(recorder.clone())
//!     .build();
//!
//! engine.submit(CartEvent::Checkout);
//! engine.settled().await;
//!
//! assert_eq!(recorder.events(), vec![CartEvent::Checkout, CartEvent::OrderPlaced]);
//! assert!(recorder.reducer_errors().is_empty());
//! ```
//!
//! # Waiting for a State
//!
//! ```ignore
//! let mut states = engine.subscribe_state();
//! let loaded = wait_for(&mut states, Duration::from_secs(1), |s| s.profile.is_some()).await;
//! assert!(loaded.is_some());
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::broadcast::StateSubscription;
use crate::error::Fault;
use crate::listener::Listener;
use crate::reducer::Reducer;

/// One recorded listener call.
#[derive(Debug, Clone, PartialEq)]
pub enum Hook<E, S, F, C> {
    BeforeEvent { event: E, state: S },
    AfterEvent { new_state: S, old_state: S, event: E },
    Effect(F),
    Command(C),
    ReducerError { event: E, fault: String },
    ActorError { command: C, fault: String },
}

/// The `Hook` type recorded for reducer `R`.
pub type HookOf<R> = Hook<
    <R as Reducer>::Event,
    <R as Reducer>::State,
    <R as Reducer>::Effect,
    <R as Reducer>::Command,
>;

/// Listener that records every call, in order.
///
/// Clones share the same log, so keep one clone for assertions and hand the
/// other to the engine.
pub struct RecordingListener<R: Reducer> {
    calls: Arc<Mutex<Vec<HookOf<R>>>>,
}

impl<R: Reducer> RecordingListener<R> {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, hook: HookOf<R>) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<HookOf<R>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Events that were committed (one per `after_event`), in commit order.
    pub fn events(&self) -> Vec<R::Event> {
        self.calls()
            .into_iter()
            .filter_map(|hook| match hook {
                Hook::AfterEvent { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Effects announced through `on_effect`, in order.
    pub fn effects(&self) -> Vec<R::Effect> {
        self.calls()
            .into_iter()
            .filter_map(|hook| match hook {
                Hook::Effect(effect) => Some(effect),
                _ => None,
            })
            .collect()
    }

    /// Commands announced through `on_command`, in order.
    pub fn commands(&self) -> Vec<R::Command> {
        self.calls()
            .into_iter()
            .filter_map(|hook| match hook {
                Hook::Command(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    /// `(event, fault message)` for every reducer fault.
    pub fn reducer_errors(&self) -> Vec<(R::Event, String)> {
        self.calls()
            .into_iter()
            .filter_map(|hook| match hook {
                Hook::ReducerError { event, fault } => Some((event, fault)),
                _ => None,
            })
            .collect()
    }

    /// `(command, fault message)` for every actor fault.
    pub fn actor_errors(&self) -> Vec<(R::Command, String)> {
        self.calls()
            .into_iter()
            .filter_map(|hook| match hook {
                Hook::ActorError { command, fault } => Some((command, fault)),
                _ => None,
            })
            .collect()
    }
}

impl<R: Reducer> Default for RecordingListener<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Reducer> Clone for RecordingListener<R> {
    fn clone(&self) -> Self {
        Self {
            calls: self.calls.clone(),
        }
    }
}

impl<R: Reducer> fmt::Debug for RecordingListener<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingListener")
            .field("call_count", &self.len())
            .finish()
    }
}

impl<R: Reducer> Listener<R> for RecordingListener<R> {
    fn before_event(&self, _key: &str, event: &R::Event, state: &R::State) {
        self.record(Hook::BeforeEvent {
            event: event.clone(),
            state: state.clone(),
        });
    }

    fn after_event(&self, _key: &str, new_state: &R::State, old_state: &R::State, event: &R::Event) {
        self.record(Hook::AfterEvent {
            new_state: new_state.clone(),
            old_state: old_state.clone(),
            event: event.clone(),
        });
    }

    fn on_effect(&self, _key: &str, effect: &R::Effect) {
        self.record(Hook::Effect(effect.clone()));
    }

    fn on_command(&self, _key: &str, command: &R::Command) {
        self.record(Hook::Command(command.clone()));
    }

    fn on_reducer_error(&self, _key: &str, event: &R::Event, fault: &Fault) {
        self.record(Hook::ReducerError {
            event: event.clone(),
            fault: fault.to_string(),
        });
    }

    fn on_actor_error(&self, _key: &str, command: &R::Command, fault: &Fault) {
        self.record(Hook::ActorError {
            command: command.clone(),
            fault: fault.to_string(),
        });
    }
}

/// Receive states until one matches `predicate`.
///
/// Returns `None` if the subscription ends or `timeout` elapses first.
pub async fn wait_for<S, P>(
    subscription: &mut StateSubscription<S>,
    timeout: Duration,
    mut predicate: P,
) -> Option<S>
where
    S: Send + 'static,
    P: FnMut(&S) -> bool,
{
    let search = async {
        while let Some(state) = subscription.recv().await {
            if predicate(&state) {
                return Some(state);
            }
        }
        None
    };
    tokio::time::timeout(timeout, search).await.ok().flatten()
}
