//! Ripple Engine - one mailbox, one writer, many commands.
//!
//! The Engine is the central coordinator:
//!
//! ```text
//! submit(event) ─► Mailbox ─► dispatch loop (single writer)
//!    ▲                          │
//!    │                          ├─► reduce(event, state)
//!    │                          ├─► commit state ─► state subscribers
//!    │                          ├─► effects ──────► effect subscribers
//!    │                          └─► commands ─────► task group
//!    │                                                  │
//!    │                                        Executor::execute(command)
//!    │                                                  │
//!    └──────────────────── events ──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ripple::EngineBuilder;
//!
//! let engine = EngineBuilder::new(Profile::default(), ProfileReducer)
//!     .with_executor(ProfileExecutor::new(client))
//!     .with_listener(AuditListener::default())
//!     .with_start_event(ProfileEvent::Opened)
//!     .build();
//!
//! engine.start();
//! engine.submit(ProfileEvent::Refresh);
//!
//! let mut states = engine.subscribe_state();
//! while let Some(profile) = states.recv().await {
//!     render(&profile);
//! }
//! ```
//!
//! # Ordering
//!
//! The mailbox is a FIFO queue drained by exactly one task, so state commits
//! happen in submission order and never overlap. Commands run on their own
//! tasks; the events they produce go back through the mailbox like any other
//! submission, which is why a command can never deadlock against the writer.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::broadcast::{EffectBus, EffectSubscription, StateChannel, StateSubscription};
use crate::config::EngineConfig;
use crate::error::{panic_message, Fault};
use crate::executor::{Executor, NoCommands};
use crate::inflight::{Inflight, InflightGuard};
use crate::listener::{Listener, ListenerRegistry, ListenerSet};
use crate::reducer::{default_key, Reducer, ReducerRunner, TransitionOf};

// =============================================================================
// Mailbox
// =============================================================================

/// Cloneable submission handle for an engine.
///
/// Hand a `Mailbox` to producers that should not own the engine itself.
/// Submitting after the engine stopped is a silent no-op.
pub struct Mailbox<E> {
    tx: mpsc::UnboundedSender<E>,
    cancel: CancellationToken,
    inflight: Arc<Inflight>,
}

impl<E> Mailbox<E> {
    /// Enqueue `event` for dispatch. Returns immediately.
    pub fn submit(&self, event: E) {
        if self.cancel.is_cancelled() {
            return;
        }
        // Count before sending so `settled` cannot observe zero in between.
        self.inflight.inc();
        if self.tx.send(event).is_err() {
            self.inflight.dec();
        }
    }

    /// Returns true once the engine has been stopped.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<E> Clone for Mailbox<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
            inflight: self.inflight.clone(),
        }
    }
}

impl<E> fmt::Debug for Mailbox<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Engine
// =============================================================================

/// A running state engine.
///
/// Created by [`EngineBuilder::build`]. Dropping the engine stops it.
pub struct Engine<R: Reducer> {
    key: String,
    mailbox: Mailbox<R::Event>,
    state: Arc<StateChannel<R::State>>,
    effects: Arc<EffectBus<R::Effect>>,
    start_event: Option<R::Event>,
    cancel: CancellationToken,
    inflight: Arc<Inflight>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Reducer> Engine<R> {
    /// Create a new engine builder.
    pub fn builder(initial: R::State, reducer: R) -> EngineBuilder<R> {
        EngineBuilder::new(initial, reducer)
    }

    /// The identity key used in logs and listener calls.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Enqueue `event` for dispatch.
    ///
    /// Returns immediately and never fails. Faults raised while dispatching
    /// are reported to listeners, not to the caller.
    pub fn submit(&self, event: R::Event) {
        self.mailbox.submit(event);
    }

    /// A cloneable handle for submitting events from other tasks.
    pub fn mailbox(&self) -> Mailbox<R::Event> {
        self.mailbox.clone()
    }

    /// Submit the configured start event, if any.
    ///
    /// Not idempotent: every call submits the start event again.
    pub fn start(&self) {
        if let Some(event) = &self.start_event {
            self.submit(event.clone());
        }
    }

    /// Stop the engine.
    ///
    /// Queued events are discarded and every running command is cancelled.
    /// Irreversible: the engine cannot be restarted.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!(key = %self.key, "stopping engine");
        }
        self.cancel.cancel();
    }

    /// Stop the engine and wait for its dispatch loop and command tasks to exit.
    ///
    /// After this returns no listener hook will be called again.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(key = %self.key, "dispatch loop panicked during shutdown");
                }
            }
        }
    }

    /// Returns true once `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The current state.
    pub fn state(&self) -> R::State {
        (*self.state.current()).clone()
    }

    /// Subscribe to state: the current value first, then every commit.
    pub fn subscribe_state(&self) -> StateSubscription<R::State> {
        self.state.subscribe()
    }

    /// Subscribe to effects emitted from now on.
    pub fn subscribe_effects(&self) -> EffectSubscription<R::Effect> {
        self.effects.subscribe()
    }

    /// Wait until every queued event is dispatched and every command has
    /// finished, or the engine stops.
    ///
    /// Never resolves while a command's event stream is still producing.
    pub async fn settled(&self) {
        self.inflight.wait_zero(&self.cancel).await;
    }

    /// Number of queued events plus running commands.
    pub fn pending(&self) -> usize {
        self.inflight.count()
    }

    /// Number of live state subscriptions.
    pub fn state_subscribers(&self) -> usize {
        self.state.subscriber_count()
    }

    /// Number of live effect subscriptions.
    pub fn effect_subscribers(&self) -> usize {
        self.effects.subscriber_count()
    }
}

impl<R: Reducer> Drop for Engine<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<R: Reducer> fmt::Debug for Engine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("key", &self.key)
            .field("stopped", &self.is_stopped())
            .field("pending", &self.pending())
            .field("state_subscribers", &self.state_subscribers())
            .field("effect_subscribers", &self.effect_subscribers())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Engine Builder
// =============================================================================

/// Builder for constructing an [`Engine`].
///
/// # Example
///
/// ```ignore
/// let engine = EngineBuilder::new(Cart::default(), CartReducer)
///     .with_executor(CheckoutExecutor::new(payments))
///     .with_registry(&registry)
///     .with_listener(CartMetrics::new())
///     .with_key("cart")
///     .build();
/// ```
pub struct EngineBuilder<R: Reducer> {
    initial: R::State,
    reducer: R,
    executor: Arc<dyn Executor<R::Command, R::Event>>,
    listeners: ListenerSet<R>,
    start_event: Option<R::Event>,
    key: Option<String>,
    config: EngineConfig,
}

impl<R: Reducer> EngineBuilder<R> {
    /// Create a builder with the initial state and the reducer.
    ///
    /// The executor defaults to [`NoCommands`].
    pub fn new(initial: R::State, reducer: R) -> Self {
        Self {
            initial,
            reducer,
            executor: Arc::new(NoCommands),
            listeners: ListenerSet::new(),
            start_event: None,
            key: None,
            config: EngineConfig::default(),
        }
    }

    /// Set the executor that runs commands.
    pub fn with_executor<X>(mut self, executor: X) -> Self
    where
        X: Executor<R::Command, R::Event>,
    {
        self.executor = Arc::new(executor);
        self
    }

    /// Add an instance listener. Listeners run in the order they are added.
    pub fn with_listener<L: Listener<R>>(mut self, listener: L) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Add an already shared instance listener.
    pub fn with_listener_arc(mut self, listener: Arc<dyn Listener<R>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Attach the global listeners of `registry`.
    ///
    /// Global listeners run before instance listeners.
    pub fn with_registry(mut self, registry: &ListenerRegistry) -> Self {
        self.listeners.attach_registry(registry);
        self
    }

    /// Event submitted by [`Engine::start`].
    pub fn with_start_event(mut self, event: R::Event) -> Self {
        self.start_event = Some(event);
        self
    }

    /// Override the identity key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Use a specific configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine and spawn its dispatch loop.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn build(self) -> Engine<R> {
        let key = self
            .key
            .or(self.config.key)
            .unwrap_or_else(default_key::<R>);

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let inflight = Arc::new(Inflight::new());
        let mailbox = Mailbox {
            tx,
            cancel: cancel.clone(),
            inflight: inflight.clone(),
        };
        let state = Arc::new(StateChannel::new(self.initial));
        let effects = Arc::new(EffectBus::new());

        let dispatch = DispatchLoop {
            key: key.clone(),
            reducer: ReducerRunner::new(self.reducer, key.clone()),
            listeners: Arc::new(self.listeners),
            executor: self.executor,
            state: state.clone(),
            effects: effects.clone(),
            mailbox: mailbox.clone(),
            cancel: cancel.clone(),
            inflight: inflight.clone(),
            commands: JoinSet::new(),
        };

        let handle = tokio::spawn(dispatch.run(rx));

        Engine {
            key,
            mailbox,
            state,
            effects,
            start_event: self.start_event,
            cancel,
            inflight,
            handle: Mutex::new(Some(handle)),
        }
    }
}

impl<R: Reducer> fmt::Debug for EngineBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("key", &self.key)
            .field("listeners", &self.listeners)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Dispatch Loop
// =============================================================================

/// The single writer. Owns the reducer and the command task group.
struct DispatchLoop<R: Reducer> {
    key: String,
    reducer: ReducerRunner<R>,
    listeners: Arc<ListenerSet<R>>,
    executor: Arc<dyn Executor<R::Command, R::Event>>,
    state: Arc<StateChannel<R::State>>,
    effects: Arc<EffectBus<R::Effect>>,
    /// Feedback path for command tasks.
    mailbox: Mailbox<R::Event>,
    cancel: CancellationToken,
    inflight: Arc<Inflight>,
    commands: JoinSet<()>,
}

impl<R: Reducer> DispatchLoop<R> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<R::Event>) {
        info!(
            key = %self.key,
            listener_count = self.listeners.len(),
            "engine started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(joined) = self.commands.join_next(), if !self.commands.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(key = %self.key, "command task panicked");
                        }
                    }
                }
                received = rx.recv() => match received {
                    Some(event) => {
                        let _guard = InflightGuard::adopt(self.inflight.clone());
                        self.dispatch(event);
                    }
                    None => break,
                },
            }
        }

        // Discard queued events and abort every command task before closing
        // the broadcasters, so nothing is published after this point.
        rx.close();
        self.commands.shutdown().await;
        self.state.close();
        self.effects.close();
        self.inflight.clear();

        info!(key = %self.key, "engine stopped");
    }

    /// Dispatch one event. Never panics.
    fn dispatch(&mut self, event: R::Event) {
        trace!(key = %self.key, event = ?event, "dispatching event");

        let old = self.state.current();
        let transition = match self.decide(&event, &old) {
            Ok(transition) => transition,
            Err(fault) => {
                self.report_fault(&event, &fault);
                return;
            }
        };

        self.state.commit(transition.state);
        let new = self.state.current();
        self.observe("after_event", |listeners, key| {
            listeners.after_event(key, &new, &old, &event)
        });

        for effect in transition.effects {
            if self.cancel.is_cancelled() {
                return;
            }
            self.observe("on_effect", |listeners, key| listeners.on_effect(key, &effect));
            self.effects.publish(effect);
        }

        for command in transition.commands {
            if self.cancel.is_cancelled() {
                return;
            }
            self.observe("on_command", |listeners, key| listeners.on_command(key, &command));
            self.spawn_command(command);
        }
    }

    /// Everything before the commit. A panic here means nothing is committed.
    fn decide(&self, event: &R::Event, old: &R::State) -> Result<TransitionOf<R>, Fault> {
        let listeners = &self.listeners;
        let key = &self.key;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listeners.before_event(key, event, old))) {
            let fault = Fault::reducer(key, panic_message(payload.as_ref()));
            error!(
                key = %self.key,
                event = ?event,
                error = %fault,
                "before_event listener panicked"
            );
            return Err(fault);
        }
        self.reducer.reduce(event, old)
    }

    /// Run a post-commit hook. A panic is logged and dispatch carries on.
    fn observe<F>(&self, hook: &'static str, call: F)
    where
        F: FnOnce(&ListenerSet<R>, &str),
    {
        let listeners = &self.listeners;
        let key = &self.key;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| call(listeners, key))) {
            error!(
                key = %self.key,
                hook,
                panic = %panic_message(payload.as_ref()),
                "listener panicked after commit"
            );
        }
    }

    fn report_fault(&self, event: &R::Event, fault: &Fault) {
        if self.cancel.is_cancelled() {
            return;
        }
        let listeners = &self.listeners;
        let key = &self.key;
        if let Err(payload) =
            catch_unwind(AssertUnwindSafe(|| listeners.on_reducer_error(key, event, fault)))
        {
            error!(
                key = %self.key,
                panic = %panic_message(payload.as_ref()),
                "on_reducer_error listener panicked"
            );
        }
    }

    fn spawn_command(&mut self, command: R::Command) {
        self.inflight.inc();
        let task = CommandTask::<R> {
            key: self.key.clone(),
            executor: self.executor.clone(),
            listeners: self.listeners.clone(),
            mailbox: self.mailbox.clone(),
            cancel: self.cancel.clone(),
            _guard: InflightGuard::adopt(self.inflight.clone()),
        };
        self.commands.spawn(task.run(command));
    }
}

// =============================================================================
// Command Task
// =============================================================================

/// Drives one command's event stream back into the mailbox.
struct CommandTask<R: Reducer> {
    key: String,
    executor: Arc<dyn Executor<R::Command, R::Event>>,
    listeners: Arc<ListenerSet<R>>,
    mailbox: Mailbox<R::Event>,
    cancel: CancellationToken,
    /// Released when the task ends, including by abort.
    _guard: InflightGuard,
}

impl<R: Reducer> CommandTask<R> {
    async fn run(self, command: R::Command) {
        let executor = self.executor.clone();
        let started = catch_unwind(AssertUnwindSafe(|| executor.execute(command.clone())));
        let mut events = match started {
            Ok(stream) => AssertUnwindSafe(stream).catch_unwind(),
            Err(payload) => {
                let err = anyhow!("executor panicked: {}", panic_message(payload.as_ref()));
                self.fail(&command, err);
                return;
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                next = events.next() => next,
            };

            match next {
                None => break,
                Some(Ok(Ok(event))) => {
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    debug!(key = %self.key, event = ?event, "command produced event");
                    self.mailbox.submit(event);
                }
                Some(Ok(Err(err))) => {
                    self.fail(&command, err);
                    break;
                }
                Some(Err(payload)) => {
                    let err = anyhow!("executor panicked: {}", panic_message(payload.as_ref()));
                    self.fail(&command, err);
                    break;
                }
            }
        }
    }

    fn fail(&self, command: &R::Command, err: anyhow::Error) {
        if self.cancel.is_cancelled() {
            return;
        }
        let fault = Fault::actor(&self.key, err);
        warn!(
            key = %self.key,
            command = ?command,
            error = %fault,
            "command stream failed"
        );
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| {
            self.listeners.on_actor_error(&self.key, command, &fault)
        })) {
            error!(
                key = %self.key,
                panic = %panic_message(payload.as_ref()),
                "on_actor_error listener panicked"
            );
        }
    }
}
