//! # Work: the body contract shared by jobs and handlers.
//!
//! [`Work`] is the unit-of-work trait: a named, async, cancelable body
//! that produces a [`Value`]. Implementations return a **fresh** future on
//! every [`spawn`](Work::spawn) call; this is what makes reusable handlers
//! and cyclic edge graphs sound — each activation owns its own state.
//!
//! [`WorkFn`] wraps a closure `F: Fn(TaskNode) -> Fut`, producing a fresh
//! future per spawn without shared mutable state.
//!
//! ## The pledge
//!
//! Bodies run on a cooperative single-thread loop: a body that blocks the
//! thread stalls every other unit. The contract is acknowledged by quoting
//! [`PLEDGE`] when constructing work. A mismatched pledge logs a warning
//! and nothing else — it is a documentation discipline, not a runtime
//! guard.
//!
//! ## Example
//! ```rust
//! use commandeer::{TaskNode, Work, WorkFn, PLEDGE};
//! use serde_json::json;
//!
//! let work = WorkFn::arc("answer", PLEDGE, |_node: TaskNode| async move {
//!     Ok(json!(42))
//! });
//! assert_eq!(work.name(), "answer");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::TaskError;
use crate::nodes::TaskNode;

/// The cooperative-scheduling acknowledgement quoted by work constructors.
pub const PLEDGE: &str = "I assure all time-consuming work is delegated externally.";

/// Boxed future returned by [`Work::spawn`].
pub type WorkFuture = Pin<Box<dyn Future<Output = Result<Value, TaskError>> + Send + 'static>>;

/// Shared handle to a work object.
pub type WorkRef = Arc<dyn Work>;

/// Asynchronous, cancelable unit of work.
///
/// ## Rules
/// - **Fresh futures**: each `spawn()` call creates a new independent
///   future owning its own state.
/// - **No blocking**: bodies must not block the scheduling thread; anything
///   time-consuming is delegated and awaited.
/// - **Cancellation**: bodies are dropped at their next suspension point
///   when their node is terminated; a body that never awaits cannot be
///   preempted.
pub trait Work: Send + Sync + 'static {
    /// Returns a stable, human-readable name.
    ///
    /// Used for logging and stuck-node reporting during shutdown.
    fn name(&self) -> &str;

    /// Returns the author's cooperative-scheduling acknowledgement.
    ///
    /// Quote [`PLEDGE`]; any other value logs a warning at scheduling time.
    fn pledge(&self) -> &'static str;

    /// Creates a new future that runs the body to completion.
    ///
    /// `node` is the owning task node: the body reads `data`, submits
    /// child jobs and handlers, and may request commander shutdown
    /// through it.
    fn spawn(&self, node: TaskNode) -> WorkFuture;
}

/// Function-backed work implementation.
///
/// Wraps a closure that *creates* a new future per spawn.
pub struct WorkFn<F> {
    name: Cow<'static, str>,
    pledge: &'static str,
    f: F,
}

impl<F> WorkFn<F> {
    /// Creates new function-backed work.
    ///
    /// Prefer [`WorkFn::arc`] when you immediately need a [`WorkRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, pledge: &'static str, f: F) -> Self {
        Self {
            name: name.into(),
            pledge,
            f,
        }
    }

    /// Creates the work and returns it as a shared handle (`Arc<dyn Work>`).
    pub fn arc(name: impl Into<Cow<'static, str>>, pledge: &'static str, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, pledge, f))
    }
}

impl<F, Fut> Work for WorkFn<F>
where
    F: Fn(TaskNode) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn pledge(&self) -> &'static str {
        self.pledge
    }

    fn spawn(&self, node: TaskNode) -> WorkFuture {
        let fut = (self.f)(node);
        Box::pin(fut)
    }
}

impl<F> std::fmt::Debug for WorkFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkFn").field("name", &self.name).finish()
    }
}

/// Warns once per construction when the acknowledgement was not quoted.
pub(crate) fn check_pledge(work: &dyn Work) {
    if work.pledge() != PLEDGE {
        tracing::warn!(
            task = work.name(),
            "work constructed without the cooperative-scheduling pledge; \
             bodies must not block the commander thread"
        );
    }
}
