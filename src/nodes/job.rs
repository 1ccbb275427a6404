//! # Job: a coarse, queue-scheduled unit of work.
//!
//! Jobs are submitted to the commander's FIFO queue and dispatched in
//! order; each dequeued job's body is spawned as a concurrent task on the
//! loop. Inside the body, `node.put_job` enqueues further jobs and
//! `node.call_handler` starts handlers directly.
//!
//! A `Job` value is a cheap cloneable handle: keep a clone to inspect
//! `state`, `result`, and `exception` after the run.

use std::borrow::Cow;
use std::future::Future;
use std::ops::Deref;

use serde_json::Value;

use crate::error::TaskError;
use crate::nodes::node::{NodeInner, TaskNode};
use crate::nodes::state::NodeKind;
use crate::nodes::work::{check_pledge, Work, WorkFn, WorkRef};
use crate::nodes::HandlerCoroutine;

/// A queue-scheduled unit of work in the task tree.
///
/// Dereferences to [`TaskNode`] for the shared node surface (state,
/// result, callbacks, data).
#[derive(Clone)]
pub struct Job {
    node: TaskNode,
}

impl Job {
    /// Creates a job from a [`Work`] implementation.
    pub fn new(work: impl Work) -> Self {
        Self::from_arc(std::sync::Arc::new(work))
    }

    /// Creates a job from a shared work handle.
    pub fn from_arc(work: WorkRef) -> Self {
        check_pledge(work.as_ref());
        Self {
            node: TaskNode::from_arc(NodeInner::new(NodeKind::Job, Some(work))),
        }
    }

    /// Creates a job from an async closure.
    ///
    /// `pledge` is the author's acknowledgement of the no-blocking
    /// contract; quote [`PLEDGE`](crate::PLEDGE).
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

    /// Creates a job that runs a single handler and adopts its result.
    ///
    /// The handler becomes a child of the job, so the job is terminal only
    /// after the handler (and its own children) drain. A handler failure
    /// stays on the handler node; the job itself completes with `Null`.
    pub fn from_handler(handler: &HandlerCoroutine) -> Self {
        let name: Cow<'static, str> = format!("run:{}", handler.name()).into();
        let pledge = handler.pledge();
        let handler = handler.clone();
        Self::from_arc(WorkFn::arc(name, pledge, move |node: TaskNode| {
            let handler = handler.clone();
            async move {
                let handler = node.call_handler(&handler).map_err(TaskError::failed)?;
                match handler.wait().await {
                    Ok(value) => Ok(value),
                    // Failure stays on the handler node.
                    Err(_) => Ok(Value::Null),
                }
            }
        }))
    }

    /// The underlying tree node.
    pub fn task_node(&self) -> &TaskNode {
        &self.node
    }
}

impl Deref for Job {
    type Target = TaskNode;

    fn deref(&self) -> &TaskNode {
        &self.node
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.node.name())
            .field("state", &self.node.state())
            .finish()
    }
}
