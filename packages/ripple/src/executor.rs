//! Executor trait for command execution.
//!
//! Executors turn one command into a lazy stream of events. Every event the
//! stream yields is fed back into the engine's mailbox, exactly as if a
//! producer had called `Engine::submit`.
//!
//! # Key Properties
//!
//! - **Zero or more events**: A stream may end immediately, yield a few events, or run forever
//! - **Cooperative cancellation**: Stopping the engine drops the stream at its next suspension point
//! - **Isolated failure**: An `Err` item ends only that command's stream

use std::future::Future;

use anyhow::Result;
use futures::stream::{self, BoxStream, StreamExt};

/// The stream of events produced by one command.
pub type EventStream<E> = BoxStream<'static, Result<E>>;

/// Asynchronous handler that maps a command to a stream of events.
///
/// Any `Fn(C) -> EventStream<E>` closure is an executor.
///
/// # Example
///
/// ```ignore
/// struct ProfileExecutor {
///     client: ApiClient,
/// }
///
/// impl Executor<ProfileCommand, ProfileEvent> for ProfileExecutor {
///     fn execute(&self, command: ProfileCommand) -> EventStream<ProfileEvent> {
///         let client = self.client.clone();
///         match command {
///             ProfileCommand::Load { id } => executor::once(async move {
///                 let profile = client.profile(id).await?;
///                 Ok(ProfileEvent::Loaded(profile))
///             }),
///         }
///     }
/// }
/// ```
pub trait Executor<C, E>: Send + Sync + 'static {
    /// Start executing `command`.
    ///
    /// The returned stream is polled on the engine's task group. It should not
    /// do any work before it is first polled.
    fn execute(&self, command: C) -> EventStream<E>;
}

impl<C, E, F> Executor<C, E> for F
where
    F: Fn(C) -> EventStream<E> + Send + Sync + 'static,
{
    fn execute(&self, command: C) -> EventStream<E> {
        self(command)
    }
}

/// Executor for engines whose reducer never emits commands.
///
/// Any command it does receive yields no events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommands;

impl<C, E: Send + 'static> Executor<C, E> for NoCommands {
    fn execute(&self, _command: C) -> EventStream<E> {
        stream::empty().boxed()
    }
}

/// A stream that yields the output of a single future.
pub fn once<E, Fut>(future: Fut) -> EventStream<E>
where
    E: Send + 'static,
    Fut: Future<Output = Result<E>> + Send + 'static,
{
    stream::once(future).boxed()
}

/// A stream that yields the given events in order.
pub fn iter<E, I>(events: I) -> EventStream<E>
where
    E: Send + 'static,
    I: IntoIterator<Item = E>,
    I::IntoIter: Send + 'static,
{
    stream::iter(events.into_iter().map(Ok)).boxed()
}

/// A stream that yields no events.
pub fn none<E: Send + 'static>() -> EventStream<E> {
    stream::empty().boxed()
}
