//! Core value traits for the ripple state engine.
//!
//! # Overview
//!
//! Ripple moves four kinds of values around:
//! - [`Event`] = Input (something happened, please react)
//! - [`State`] = Snapshot (the one current value the engine owns)
//! - [`Effect`] = Notification (one-shot, delivered to whoever is listening right now)
//! - [`Command`] = Intent (asynchronous work for an executor)
//!
//! All four are opaque, caller-defined value types. They are blanket-implemented
//! for any `Clone + Debug + Send + Sync + 'static` type, so plain enums and
//! structs work without boilerplate.
//!
//! A reducer turns one event and the current state into a [`Transition`]:
//! the next state plus the ordered effects and commands it produced.

use std::fmt::Debug;

/// Marker trait for events.
///
/// Events are immutable inputs that trigger a transition. They arrive from
/// producers through `Engine::submit` and from executors as feedback.
pub trait Event: Clone + Debug + Send + Sync + 'static {}

impl<T: Clone + Debug + Send + Sync + 'static> Event for T {}

/// Marker trait for states.
///
/// Exactly one current state exists per engine at any time. States are
/// replaced wholesale on every commit; they are never mutated in place.
pub trait State: Clone + Debug + Send + Sync + 'static {}

impl<T: Clone + Debug + Send + Sync + 'static> State for T {}

/// Marker trait for effects.
///
/// Effects are transient notifications. They are delivered to the effect
/// subscribers registered at emission time and then forgotten.
pub trait Effect: Clone + Debug + Send + Sync + 'static {}

impl<T: Clone + Debug + Send + Sync + 'static> Effect for T {}

/// Marker trait for commands.
///
/// Commands request asynchronous side-effecting work. Each command is handed
/// to the engine's executor, whose output events re-enter the mailbox.
pub trait Command: Clone + Debug + Send + Sync + 'static {}

impl<T: Clone + Debug + Send + Sync + 'static> Command for T {}

/// The result of applying one event to one state.
///
/// Effects and commands keep the order in which the reducer produced them:
/// effects are published in that order and commands are scheduled in that
/// order (though they may complete in any order).
///
/// # Example
///
/// ```ignore
/// fn reduce(&self, event: &CartEvent, state: &Cart) -> Transition<Cart, CartEffect, CartCommand> {
///     match event {
///         CartEvent::Checkout => Transition::to(state.clone().locked())
///             .with_effect(CartEffect::ShowSpinner)
///             .with_command(CartCommand::SubmitOrder { items: state.items.clone() }),
///         CartEvent::Cleared => Transition::to(Cart::default()),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S, F, C> {
    /// The state to commit.
    pub state: S,
    /// Effects to publish after the commit, in order.
    pub effects: Vec<F>,
    /// Commands to schedule after the effects, in order.
    pub commands: Vec<C>,
}

impl<S, F, C> Transition<S, F, C> {
    /// Move to `state` with no effects and no commands.
    pub fn to(state: S) -> Self {
        Self {
            state,
            effects: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Append one effect.
    pub fn with_effect(mut self, effect: F) -> Self {
        self.effects.push(effect);
        self
    }

    /// Append several effects, keeping their order.
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = F>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Append one command.
    pub fn with_command(mut self, command: C) -> Self {
        self.commands.push(command);
        self
    }

    /// Append several commands, keeping their order.
    pub fn with_commands(mut self, commands: impl IntoIterator<Item = C>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Returns true if the transition produced neither effects nor commands.
    pub fn is_quiet(&self) -> bool {
        self.effects.is_empty() && self.commands.is_empty()
    }
}
