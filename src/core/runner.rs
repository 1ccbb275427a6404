//! # Body runner and completion propagation.
//!
//! [`drive`] executes one activation of a node's body:
//!
//! ```text
//! state → Running
//!   → at_job_start / at_handler_start
//!   → body future, raced against the node's cancellation token
//!        ├─ Ok(value)   → result recorded
//!        ├─ Err(error)  → state Failed, exception recorded, at_exception
//!        └─ cancelled   → state Terminated, at_terminate
//!   → body-done flag + completion signal (wakes waiters)
//!   → propagate()
//! ```
//!
//! [`propagate`] walks the ancestor chain sealing every node that has
//! drained (body returned AND child set empty): it fires the node's
//! `at_job_end` / `at_handler_end` callbacks, unlinks it from its parent,
//! and re-evaluates the parent. Reaching the commander root records the
//! top-level completion and wakes the loop's empty check.
//!
//! ## Rules
//! - Cancellation lands at the body's next suspension point; the body
//!   future is dropped, never polled again.
//! - A `Failed` child seals and unlinks exactly like a `Done` child —
//!   completion counting is agnostic to success.
//! - A `Terminated` node fires no `*_end` callback; `at_terminate` already
//!   ran.
//! - Sealing is claimed atomically, so concurrent child completions cannot
//!   double-fire a parent's terminal callbacks.

use crate::callbacks::{dispatch, CallbackEvent};
use crate::nodes::{NodeKind, NodeState, TaskNode};

/// Runs one activation of `node`'s body and propagates its completion.
pub(crate) async fn drive(node: TaskNode) {
    let inner = node.inner_arc().clone();
    let (start_event, kind) = match inner.kind() {
        NodeKind::Job => (CallbackEvent::AtJobStart, "job"),
        NodeKind::Handler => (CallbackEvent::AtHandlerStart, "handler"),
        NodeKind::Commander => return,
    };

    let name = inner.name();
    inner.set_state(NodeState::Running);
    tracing::debug!(task = %name, kind, "body starting");
    dispatch(&node, start_event).await;

    let Some(work) = inner.work() else {
        inner.mark_body_done();
        propagate(node).await;
        return;
    };

    let token = inner.cancel_token();
    let body = work.spawn(node.clone());

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = body => Some(result),
    };

    match outcome {
        Some(Ok(value)) => {
            inner.set_result(value);
            tracing::debug!(task = %name, kind, "body finished");
        }
        Some(Err(error)) => {
            inner.set_state(NodeState::Failed);
            inner.set_exception(error.clone());
            tracing::error!(task = %name, kind, error = %error, "body failed");
            dispatch(&node, CallbackEvent::AtException).await;
        }
        None => {
            inner.set_state(NodeState::Terminated);
            tracing::debug!(task = %name, kind, "body terminated");
            dispatch(&node, CallbackEvent::AtTerminate).await;
        }
    }

    inner.mark_body_done();
    propagate(node).await;
}

/// Terminates a node whose body never started (drained from the queue
/// during shutdown): fires `at_terminate`, then propagates as usual.
pub(crate) async fn terminate_unstarted(node: TaskNode) {
    let inner = node.inner_arc().clone();
    inner.set_state(NodeState::Terminated);
    tracing::debug!(task = %inner.name(), "terminated before start");
    dispatch(&node, CallbackEvent::AtTerminate).await;
    inner.mark_body_done();
    propagate(node).await;
}

/// Seals every drained node from `start` upward.
pub(crate) async fn propagate(start: TaskNode) {
    let mut current = start;
    loop {
        let inner = current.inner_arc().clone();
        if !inner.is_body_done() || !inner.children_is_empty() {
            return;
        }
        if !inner.seal() {
            return;
        }

        let end_event = match inner.kind() {
            NodeKind::Job => CallbackEvent::AtJobEnd,
            NodeKind::Handler => CallbackEvent::AtHandlerEnd,
            NodeKind::Commander => return,
        };

        match inner.state() {
            // at_terminate already fired; the terminated path skips *_end.
            NodeState::Terminated => {}
            NodeState::Failed => dispatch(&current, end_event).await,
            _ => {
                inner.set_state(NodeState::Done);
                dispatch(&current, end_event).await;
            }
        }
        tracing::debug!(task = %inner.name(), state = %inner.state(), "node sealed");

        let Some(parent) = inner.parent_node() else {
            return;
        };
        parent.remove_child(&inner);

        if parent.kind() == NodeKind::Commander {
            if let Some(core) = inner.commander_core() {
                core.note_top_level_sealed(&current);
            }
            return;
        }
        current = TaskNode::from_arc(parent);
    }
}
