//! Listeners - observe the dispatch lifecycle without taking part in it.
//!
//! Listeners provide a first-class way to watch an engine for:
//! - Logging and auditing
//! - Metrics
//! - Debug tooling and tests
//!
//! # Hook Points
//!
//! ```text
//! submit(event)
//!  → before_event      (event, current state)
//!  → reduce
//!  → after_event       (new state, old state, event)
//!  → on_effect         (once per effect, before publication)
//!  → on_command        (once per command, before scheduling)
//!
//! on_reducer_error     (dispatch fault)
//! on_actor_error       (command stream fault)
//! ```
//!
//! Hooks run synchronously on the engine's dispatch path. They must be cheap
//! and must not call back into `Engine::submit`.
//!
//! A panic in `before_event` is a reducer fault: nothing is committed. A
//! panic in any later hook is logged and the rest of the transition still
//! goes out.
//!
//! # Global Listeners
//!
//! A [`ListenerRegistry`] is an explicit configuration value holding
//! type-erased [`GlobalListener`]s. Build it once at process start and hand it
//! to every `EngineBuilder` that should carry it:
//!
//! ```ignore
//! let registry = ListenerRegistry::new().with(TracingAudit::default());
//!
//! let cart = EngineBuilder::new(Cart::default(), CartReducer)
//!     .with_registry(&registry)
//!     .build();
//! let session = EngineBuilder::new(Session::default(), SessionReducer)
//!     .with_registry(&registry)
//!     .with_listener(SessionMetrics::new())
//!     .build();
//! ```

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::error::Fault;
use crate::reducer::Reducer;

// =============================================================================
// Typed Listener
// =============================================================================

/// Typed observer for one kind of engine.
///
/// Every hook defaults to a no-op; implement only the ones you need.
#[allow(unused_variables)]
pub trait Listener<R: Reducer>: Send + Sync + 'static {
    /// An event is about to be reduced against `state`.
    fn before_event(&self, key: &str, event: &R::Event, state: &R::State) {}

    /// `new_state` has just been committed in place of `old_state`.
    fn after_event(&self, key: &str, new_state: &R::State, old_state: &R::State, event: &R::Event) {}

    /// `effect` is about to be published.
    fn on_effect(&self, key: &str, effect: &R::Effect) {}

    /// `command` is about to be scheduled.
    fn on_command(&self, key: &str, command: &R::Command) {}

    /// Dispatching `event` faulted; the state was not advanced by it.
    fn on_reducer_error(&self, key: &str, event: &R::Event, fault: &Fault) {}

    /// The event stream of `command` faulted and was terminated.
    fn on_actor_error(&self, key: &str, command: &R::Command, fault: &Fault) {}
}

// =============================================================================
// Global Listener
// =============================================================================

/// Type-erased observer attached to many engines at once.
///
/// Values are exposed through `Debug` only, which is enough for logging,
/// auditing and metrics keyed by engine.
#[allow(unused_variables)]
pub trait GlobalListener: Send + Sync + 'static {
    fn before_event(&self, key: &str, event: &dyn Debug, state: &dyn Debug) {}

    fn after_event(&self, key: &str, new_state: &dyn Debug, old_state: &dyn Debug, event: &dyn Debug) {}

    fn on_effect(&self, key: &str, effect: &dyn Debug) {}

    fn on_command(&self, key: &str, command: &dyn Debug) {}

    fn on_reducer_error(&self, key: &str, event: &dyn Debug, fault: &Fault) {}

    fn on_actor_error(&self, key: &str, command: &dyn Debug, fault: &Fault) {}
}

/// Explicit set of global listeners.
///
/// Cloning is cheap; clones share the same listeners.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Vec<Arc<dyn GlobalListener>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Listeners run in the order they are added.
    pub fn with<L: GlobalListener>(mut self, listener: L) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Add an already shared listener.
    pub fn with_arc(mut self, listener: Arc<dyn GlobalListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listener_count", &self.listeners.len())
            .finish()
    }
}

// =============================================================================
// Listener Set
// =============================================================================

/// The ordered listeners of one engine.
///
/// Global listeners run first, then instance listeners, each group in
/// registration order.
pub(crate) struct ListenerSet<R: Reducer> {
    globals: Vec<Arc<dyn GlobalListener>>,
    locals: Vec<Arc<dyn Listener<R>>>,
}

impl<R: Reducer> ListenerSet<R> {
    pub fn new() -> Self {
        Self {
            globals: Vec::new(),
            locals: Vec::new(),
        }
    }

    pub fn attach_registry(&mut self, registry: &ListenerRegistry) {
        self.globals.extend(registry.listeners.iter().cloned());
    }

    pub fn push(&mut self, listener: Arc<dyn Listener<R>>) {
        self.locals.push(listener);
    }

    pub fn len(&self) -> usize {
        self.globals.len() + self.locals.len()
    }

    pub fn before_event(&self, key: &str, event: &R::Event, state: &R::State) {
        for l in &self.globals {
            l.before_event(key, event, state);
        }
        for l in &self.locals {
            l.before_event(key, event, state);
        }
    }

    pub fn after_event(&self, key: &str, new_state: &R::State, old_state: &R::State, event: &R::Event) {
        for l in &self.globals {
            l.after_event(key, new_state, old_state, event);
        }
        for l in &self.locals {
            l.after_event(key, new_state, old_state, event);
        }
    }

    pub fn on_effect(&self, key: &str, effect: &R::Effect) {
        for l in &self.globals {
            l.on_effect(key, effect);
        }
        for l in &self.locals {
            l.on_effect(key, effect);
        }
    }

    pub fn on_command(&self, key: &str, command: &R::Command) {
        for l in &self.globals {
            l.on_command(key, command);
        }
        for l in &self.locals {
            l.on_command(key, command);
        }
    }

    pub fn on_reducer_error(&self, key: &str, event: &R::Event, fault: &Fault) {
        for l in &self.globals {
            l.on_reducer_error(key, event, fault);
        }
        for l in &self.locals {
            l.on_reducer_error(key, event, fault);
        }
    }

    pub fn on_actor_error(&self, key: &str, command: &R::Command, fault: &Fault) {
        for l in &self.globals {
            l.on_actor_error(key, command, fault);
        }
        for l in &self.locals {
            l.on_actor_error(key, command, fault);
        }
    }
}

impl<R: Reducer> Debug for ListenerSet<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("global_count", &self.globals.len())
            .field("local_count", &self.locals.len())
            .finish()
    }
}
