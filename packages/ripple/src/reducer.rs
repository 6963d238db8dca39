//! Reducer trait and panic-isolating runner.
//!
//! Reducers are pure transition functions. They read one event and the
//! current state and return a [`Transition`]: the next state plus the effects
//! and commands that follow from it.
//!
//! # Key Properties
//!
//! - **Pure**: No IO, no async, no mutation outside the returned value
//! - **Serialized**: The engine never calls `reduce` concurrently
//! - **Total**: Expected domain errors belong in the state or an effect, not a panic

use std::any::type_name;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

use crate::core::{Command, Effect, Event, State, Transition};
use crate::error::{panic_message, Fault};

/// Shorthand for the transition type a reducer produces.
pub type TransitionOf<R> = Transition<
    <R as Reducer>::State,
    <R as Reducer>::Effect,
    <R as Reducer>::Command,
>;

/// A pure transition function.
///
/// # Example
///
/// ```ignore
/// struct Counter;
///
/// impl Reducer for Counter {
///     type Event = CounterEvent;
///     type State = i64;
///     type Effect = CounterEffect;
///     type Command = CounterCommand;
///
///     fn reduce(&self, event: &CounterEvent, state: &i64) -> TransitionOf<Self> {
///         match event {
///             CounterEvent::Increment => Transition::to(state + 1),
///             CounterEvent::Sync => Transition::to(*state)
///                 .with_effect(CounterEffect::Syncing)
///                 .with_command(CounterCommand::Upload { value: *state }),
///         }
///     }
/// }
/// ```
pub trait Reducer: Send + Sync + 'static {
    /// Input type.
    type Event: Event;

    /// Snapshot type owned by the engine.
    type State: State;

    /// One-shot notification type.
    type Effect: Effect;

    /// Asynchronous work request type.
    type Command: Command;

    /// Compute the next state, effects and commands for `event`.
    ///
    /// # Guarantees
    ///
    /// - Called synchronously (no async)
    /// - Called serially (no concurrent calls)
    /// - `state` is the most recently committed state
    fn reduce(&self, event: &Self::Event, state: &Self::State) -> TransitionOf<Self>;
}

/// Wrapper that isolates reducer panics.
///
/// `ReducerRunner` carries the engine's identity key so that faults and log
/// lines can be routed back to the engine that raised them.
pub(crate) struct ReducerRunner<R> {
    inner: R,
    key: String,
}

impl<R: Reducer> ReducerRunner<R> {
    pub fn new(inner: R, key: String) -> Self {
        Self { inner, key }
    }

    /// Apply the reducer, converting a panic into [`Fault::Reducer`].
    ///
    /// The reducer is pure, so nothing can be left half-updated by a panic:
    /// the caller simply does not commit.
    pub fn reduce(&self, event: &R::Event, state: &R::State) -> Result<TransitionOf<R>, Fault> {
        catch_unwind(AssertUnwindSafe(|| self.inner.reduce(event, state))).map_err(|payload| {
            let fault = Fault::reducer(&self.key, panic_message(payload.as_ref()));
            error!(
                key = %self.key,
                reducer = type_name::<R>(),
                error = %fault,
                "reducer panicked"
            );
            fault
        })
    }
}

/// Default identity key for a reducer type: the last segment of its type path.
pub(crate) fn default_key<R>() -> String {
    let full = type_name::<R>();
    // Strip generic arguments before taking the last path segment.
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum CounterEvent {
        Increment,
        Decrement,
        Explode,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum CounterEffect {
        WentNegative,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum CounterCommand {
        Persist { value: i32 },
    }

    struct Counter;

    impl Reducer for Counter {
        type Event = CounterEvent;
        type State = i32;
        type Effect = CounterEffect;
        type Command = CounterCommand;

        fn reduce(&self, event: &CounterEvent, state: &i32) -> TransitionOf<Self> {
            match event {
                CounterEvent::Increment => {
                    Transition::to(state + 1).with_command(CounterCommand::Persist { value: state + 1 })
                }
                CounterEvent::Decrement if *state == 0 => {
                    Transition::to(-1).with_effect(CounterEffect::WentNegative)
                }
                CounterEvent::Decrement => Transition::to(state - 1),
                CounterEvent::Explode => panic!("counter exploded at {}", state),
            }
        }
    }

    #[test]
    fn test_runner_returns_transition() {
        let runner = ReducerRunner::new(Counter, "Counter".into());

        let t = runner.reduce(&CounterEvent::Increment, &4).unwrap();
        assert_eq!(t.state, 5);
        assert_eq!(t.commands, vec![CounterCommand::Persist { value: 5 }]);

        let t = runner.reduce(&CounterEvent::Decrement, &0).unwrap();
        assert_eq!(t.state, -1);
        assert_eq!(t.effects, vec![CounterEffect::WentNegative]);
    }

    #[test]
    fn test_runner_catches_panic() {
        let runner = ReducerRunner::new(Counter, "Counter".into());

        let fault = runner.reduce(&CounterEvent::Explode, &3).unwrap_err();
        match fault {
            Fault::Reducer { key, message } => {
                assert_eq!(key, "Counter");
                assert_eq!(message, "counter exploded at 3");
            }
            other => panic!("unexpected fault: {other:?}"),
        }
    }

    #[test]
    fn test_runner_usable_after_panic() {
        let runner = ReducerRunner::new(Counter, "Counter".into());

        assert!(runner.reduce(&CounterEvent::Explode, &0).is_err());
        assert_eq!(runner.reduce(&CounterEvent::Increment, &0).unwrap().state, 1);
    }

    #[test]
    fn test_default_key_uses_type_name() {
        assert_eq!(default_key::<Counter>(), "Counter");
        assert_eq!(default_key::<Vec<String>>(), "Vec");
    }
}
