//! # Error types used by the commandeer runtime and task bodies.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`] errors raised by the orchestration runtime itself.
//! - [`TaskError`] errors raised by individual job/handler bodies.
//!
//! Both types provide helper methods `as_label` for logs/metrics.
//! [`TaskError`] additionally distinguishes failure from cooperative
//! termination via `is_terminated()`.

use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the commandeer runtime.
///
/// These represent misuse of the API or failures in the orchestration
/// system itself. They are raised synchronously to the caller and are never
/// stored on task nodes.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// `run` was called on a commander whose loop is already running.
    #[error("commander is already running")]
    AlreadyRunning,

    /// A submission was made to a commander with no running loop.
    #[error("commander is not running")]
    NotRunning,

    /// A node operation required a commander, but the node was never
    /// attached to one.
    #[error("task node '{node}' is not bound to a commander")]
    NoCommander {
        /// Name of the detached node.
        node: String,
    },

    /// A string did not name one of the supported callback events.
    #[error("'{name}' is not a callback event")]
    InvalidCallbackEvent {
        /// The rejected event name.
        name: String,
    },

    /// Attempted to restart a one-shot handler that already reached a
    /// terminal state.
    #[error("handler '{node}' is not reusable and has already run")]
    HandlerNotReusable {
        /// Name of the spent handler.
        node: String,
    },

    /// Attempted to submit a node that is already queued or running.
    #[error("node '{node}' is already scheduled")]
    AlreadyScheduled {
        /// Name of the busy node.
        node: String,
    },

    /// Shutdown grace period was exceeded; some bodies remained stuck.
    #[error("shutdown grace {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of nodes that did not finish in time.
        stuck: Vec<String>,
    },

    /// The commander failed to build its runtime.
    #[error("failed to build commander runtime: {source}")]
    Runtime {
        /// Underlying I/O error from the runtime builder.
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::AlreadyRunning => "runtime_already_running",
            RuntimeError::NotRunning => "runtime_not_running",
            RuntimeError::NoCommander { .. } => "runtime_no_commander",
            RuntimeError::InvalidCallbackEvent { .. } => "runtime_invalid_callback_event",
            RuntimeError::HandlerNotReusable { .. } => "runtime_handler_not_reusable",
            RuntimeError::AlreadyScheduled { .. } => "runtime_already_scheduled",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Runtime { .. } => "runtime_build_failed",
        }
    }
}

/// # Errors produced by job and handler bodies.
///
/// A `Failed` error is captured on the owning node (`exception` slot,
/// state `Failed`) and is **not** propagated to the parent; the parent
/// observes it through the child's state or an `at_exception` callback.
///
/// `Terminated` signals cooperative cancellation. It is **not an error**
/// in the traditional sense, but is re-raised to anyone awaiting the node.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Body execution failed.
    #[error("execution failed: {reason}")]
    Failed {
        /// Human-readable failure description.
        reason: String,
    },

    /// The node was terminated before its body could finish.
    #[error("task terminated")]
    Terminated,
}

impl TaskError {
    /// Creates a `Failed` error from any displayable reason.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        TaskError::Failed {
            reason: reason.to_string(),
        }
    }

    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Failed { .. } => "task_failed",
            TaskError::Terminated => "task_terminated",
        }
    }

    /// True when this error represents cooperative termination rather
    /// than a real failure.
    pub fn is_terminated(&self) -> bool {
        matches!(self, TaskError::Terminated)
    }
}

impl From<String> for TaskError {
    fn from(reason: String) -> Self {
        TaskError::Failed { reason }
    }
}

impl From<&str> for TaskError {
    fn from(reason: &str) -> Self {
        TaskError::Failed {
            reason: reason.to_string(),
        }
    }
}
