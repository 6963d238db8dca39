//! # Ripple
//!
//! A unidirectional state engine where reducers decide, executors act, and
//! every result flows back through one mailbox.
//!
//! ## Core Concepts
//!
//! Ripple separates **deciding** from **doing**:
//! - [`Reducer`] = Decisions (pure: event + state → next state, effects, commands)
//! - [`Executor`] = Work (async: command → stream of events)
//!
//! Events go in, state and effects come out. Whatever an executor learns is
//! expressed as another event and submitted like any other.
//!
//! ## Architecture
//!
//! ```text
//! Producers (UI, sockets, timers)
//!     │
//!     ▼ submit()
//! Mailbox (FIFO) ◄───────────────────────────────┐
//!     │                                          │
//!     ▼ single consumer                          │
//! Dispatch loop                                  │
//!     │                                          │
//!     ├─► Reducer.reduce(event, state)           │
//!     │                                          │
//!     ├─► commit ─► StateSubscription (latest)   │
//!     │                                          │
//!     ├─► effects ─► EffectSubscription (live)   │
//!     │                                          │
//!     └─► commands ─► task group                 │
//!                        │                       │
//!                        ▼                       │
//!                  Executor.execute()            │
//!                        │                       │
//!                        └─► events ─────────────┘
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One writer** - Transitions are applied strictly one at a time, in submission order
//! 2. **Reducers are pure** - No IO, no async; a panic leaves the state untouched
//! 3. **Latest state is replayed** - New state subscribers get the current value first
//! 4. **Effects are not replayed** - Effect subscribers see only what is emitted after they subscribe
//! 5. **Faults are isolated** - A failing reducer or executor never stops the engine
//! 6. **Stop is final** - Stopping cancels every command and ignores later submissions
//!
//! ## Example
//!
//! ```ignore
//! use ripple::{executor, EngineBuilder, EventStream, Executor, Reducer, Transition, TransitionOf};
//!
//! #[derive(Debug, Clone)]
//! enum SearchEvent {
//!     QueryChanged(String),
//!     ResultsLoaded(Vec<String>),
//! }
//!
//! #[derive(Debug, Clone, Default)]
//! struct SearchState {
//!     query: String,
//!     results: Vec<String>,
//! }
//!
//! #[derive(Debug, Clone)]
//! enum SearchEffect {
//!     ScrollToTop,
//! }
//!
//! #[derive(Debug, Clone)]
//! enum SearchCommand {
//!     Search(String),
//! }
//!
//! struct SearchReducer;
//!
//! impl Reducer for SearchReducer {
//!     type Event = SearchEvent;
//!     type State = SearchState;
//!     type Effect = SearchEffect;
//!     type Command = SearchCommand;
//!
//!     fn reduce(&self, event: &SearchEvent, state: &SearchState) -> TransitionOf<Self> {
//!         match event {
//!             SearchEvent::QueryChanged(q) => Transition::to(SearchState {
//!                 query: q.clone(),
//!                 ..state.clone()
//!             })
//!             .with_command(SearchCommand::Search(q.clone())),
//!             SearchEvent::ResultsLoaded(results) => Transition::to(SearchState {
//!                 results: results.clone(),
//!                 ..state.clone()
//!             })
//!             .with_effect(SearchEffect::ScrollToTop),
//!         }
//!     }
//! }
//!
//! struct SearchExecutor {
//!     index: SearchIndex,
//! }
//!
//! impl Executor<SearchCommand, SearchEvent> for SearchExecutor {
//!     fn execute(&self, command: SearchCommand) -> EventStream<SearchEvent> {
//!         let index = self.index.clone();
//!         match command {
//!             SearchCommand::Search(q) => executor::once(async move {
//!                 Ok(SearchEvent::ResultsLoaded(index.lookup(&q).await?))
//!             }),
//!         }
//!     }
//! }
//!
//! let engine = EngineBuilder::new(SearchState::default(), SearchReducer)
//!     .with_executor(SearchExecutor { index })
//!     .build();
//!
//! let mut states = engine.subscribe_state();
//! engine.submit(SearchEvent::QueryChanged("rust".into()));
//! ```
//!
//! ## What This Is Not
//!
//! Ripple is **not**:
//! - A persistence layer (state lives in memory only)
//! - A distributed system (one engine, one process)
//! - A scheduler (there is no retry or backoff; executors decide that)

// Core modules
mod broadcast;
mod config;
mod core;
mod engine;
mod error;
mod inflight;
mod listener;
mod reducer;

// Executor helpers are addressed by module path (`executor::once`)
pub mod executor;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export core traits
pub use crate::core::{Command, Effect, Event, State, Transition};

// Re-export reducer types
pub use reducer::{Reducer, TransitionOf};

// Re-export executor types
pub use executor::{EventStream, Executor, NoCommands};

// Re-export listener types
pub use listener::{GlobalListener, Listener, ListenerRegistry};

// Re-export subscription types
pub use broadcast::{EffectSubscription, StateSubscription};

// Re-export error types
pub use crate::error::Fault;

// Re-export config types
pub use config::EngineConfig;

// Re-export engine types (primary entry point)
pub use engine::{Engine, EngineBuilder, Mailbox};
