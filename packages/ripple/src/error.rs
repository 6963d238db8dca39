//! Fault types reported by the engine.
//!
//! Ripple favors availability over fail-fast: faults raised by pluggable
//! user code never escape `Engine::submit`. They surface only through
//! listener hooks and logs.
//!
//! | Fault | Raised by | Scope | Log level |
//! |-------|-----------|-------|-----------|
//! | [`Fault::Reducer`] | a panic in the reducer or in a `before_event` hook | one event | `error` |
//! | [`Fault::Actor`] | an `Err` item or panic in a command's event stream | one command | `warn` |
//!
//! Cancellation is not a fault. A stopped engine simply stops; nothing is
//! reported to listeners.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// A fault isolated by the engine.
///
/// Cheap to clone so the same fault can be handed to every listener.
#[derive(Debug, Clone, Error)]
pub enum Fault {
    /// A panic escaped before one event's result was committed.
    ///
    /// The state is unchanged and none of the event's effects or commands
    /// were emitted.
    #[error("reducer for '{key}' panicked: {message}")]
    Reducer {
        /// Identity key of the engine.
        key: String,
        /// The panic payload rendered as text.
        message: String,
    },

    /// A command's event stream failed.
    ///
    /// Only that stream is terminated; every other task keeps running.
    #[error("executor for '{key}' failed: {error:#}")]
    Actor {
        /// Identity key of the engine.
        key: String,
        /// The error yielded by the stream (panics are converted).
        error: Arc<anyhow::Error>,
    },
}

impl Fault {
    pub(crate) fn reducer(key: &str, message: impl Into<String>) -> Self {
        Fault::Reducer {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn actor(key: &str, error: anyhow::Error) -> Self {
        Fault::Actor {
            key: key.to_string(),
            error: Arc::new(error),
        }
    }

    /// Returns the identity key of the engine that raised this fault.
    pub fn key(&self) -> &str {
        match self {
            Fault::Reducer { key, .. } | Fault::Actor { key, .. } => key,
        }
    }

    /// Returns true if this fault came from the dispatch path.
    pub fn is_reducer(&self) -> bool {
        matches!(self, Fault::Reducer { .. })
    }

    /// Returns true if this fault came from a command's event stream.
    pub fn is_actor(&self) -> bool {
        matches!(self, Fault::Actor { .. })
    }
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
