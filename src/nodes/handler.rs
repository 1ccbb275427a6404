//! # HandlerCoroutine: a fine, directly invoked unit of work.
//!
//! Handlers are not queued: `call_handler` attaches one to a parent and
//! starts its body immediately as a concurrent task on the loop. The
//! returned handle is awaitable — [`wait`](HandlerCoroutine::wait) yields
//! the body's return value or re-raises its stored error — and the handle
//! itself implements `IntoFuture`, so `handler.await` works from any body.
//!
//! Awaiting a handler that was never scheduled and never attached runs its
//! body inline in the awaiting task.
//!
//! ## Reuse
//! A handler is one-shot by default. Marking it `reusable` allows the same
//! node to be restarted after reaching a terminal state — the mechanism
//! behind cyclic edge graphs. Each restart resets state, result, and
//! exception, and runs a fresh body future; callbacks fire on every cycle.

use std::borrow::Cow;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;

use serde_json::Value;

use crate::error::TaskError;
use crate::nodes::node::{NodeInner, TaskNode};
use crate::nodes::state::{NodeKind, NodeState};
use crate::nodes::work::{check_pledge, Work, WorkFn, WorkRef, PLEDGE};

/// A directly invoked, awaitable unit of work in the task tree.
///
/// Dereferences to [`TaskNode`] for the shared node surface.
#[derive(Clone)]
pub struct HandlerCoroutine {
    node: TaskNode,
}

impl HandlerCoroutine {
    /// Creates a handler from a [`Work`] implementation.
    pub fn new(work: impl Work) -> Self {
        Self::from_arc(std::sync::Arc::new(work))
    }

    /// Creates a handler from a shared work handle.
    pub fn from_arc(work: WorkRef) -> Self {
        check_pledge(work.as_ref());
        Self {
            node: TaskNode::from_arc(NodeInner::new(NodeKind::Handler, Some(work))),
        }
    }

    /// Creates a handler from an async closure.
    ///
    /// The closure's `TaskNode` argument is the handler's own node — the
    /// self-reference through which the body reads `data`, submits child
    /// work, and requests shutdown. `pledge` acknowledges the no-blocking
    /// contract; quote [`PLEDGE`].
    pub fn from_fn<F, Fut>(
        name: impl Into<Cow<'static, str>>,
        pledge: &'static str,
        f: F,
    ) -> Self
    where
        F: Fn(TaskNode) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Self::from_arc(WorkFn::arc(name, pledge, f))
    }

    /// Whether the handler may be restarted after reaching a terminal
    /// state.
    pub fn is_reusable(&self) -> bool {
        self.node.inner_arc().is_reusable()
    }

    /// Marks the handler as restartable (used by cyclic edges).
    pub fn set_reusable(&self, reusable: bool) {
        self.node.inner_arc().set_reusable(reusable);
    }

    /// Waits for the body to finish and yields its outcome.
    ///
    /// - A handler that was never scheduled and never attached runs its
    ///   body inline here (the bare-await form).
    /// - Otherwise this waits on the completion signal.
    /// - Every waiter observes the same outcome: the cloned `result`, the
    ///   stored `Failed` error, or [`TaskError::Terminated`].
    ///
    /// Completion here means *the body returned*; the node itself stays in
    /// the tree until its children drain.
    pub async fn wait(&self) -> Result<Value, TaskError> {
        let inner = self.node.inner_arc();
        let run_inline = !inner.is_attached() && inner.claim_unscheduled();
        if run_inline {
            crate::core::drive(self.node.clone()).await;
        } else {
            let mut rx = inner.finished_rx();
            loop {
                if *rx.borrow_and_update() {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
        self.outcome()
    }

    /// The underlying tree node.
    pub fn task_node(&self) -> &TaskNode {
        &self.node
    }

    pub(crate) fn pledge(&self) -> &'static str {
        self.node
            .inner_arc()
            .work()
            .map(|work| work.pledge())
            .unwrap_or(PLEDGE)
    }

    fn outcome(&self) -> Result<Value, TaskError> {
        if self.node.state() == NodeState::Terminated {
            return Err(TaskError::Terminated);
        }
        match self.node.exception() {
            Some(error) => Err(error),
            None => Ok(self.node.result()),
        }
    }
}

impl Deref for HandlerCoroutine {
    type Target = TaskNode;

    fn deref(&self) -> &TaskNode {
        &self.node
    }
}

impl std::future::IntoFuture for HandlerCoroutine {
    type Output = Result<Value, TaskError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl std::fmt::Debug for HandlerCoroutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerCoroutine")
            .field("name", &self.node.name())
            .field("state", &self.node.state())
            .field("reusable", &self.is_reusable())
            .finish()
    }
}
