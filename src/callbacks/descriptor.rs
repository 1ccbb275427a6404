//! # Callback descriptors.
//!
//! A [`CallbackDescriptor`] wraps one user callback for a lifecycle event.
//! Callbacks come in four shapes, chosen by constructor:
//!
//! | Constructor        | Signature              | Awaited |
//! |--------------------|------------------------|---------|
//! | [`new`]            | `Fn() -> Future`       | yes     |
//! | [`with_node`]      | `Fn(TaskNode) -> Future` | yes   |
//! | [`sync`]           | `Fn()`                 | no      |
//! | [`sync_with_node`] | `Fn(TaskNode)`         | no      |
//!
//! The `with_node` variants receive the owning [`TaskNode`] at dispatch
//! time (task-node injection). Arguments beyond the node are captured by
//! the closure itself.
//!
//! [`new`]: CallbackDescriptor::new
//! [`with_node`]: CallbackDescriptor::with_node
//! [`sync`]: CallbackDescriptor::sync
//! [`sync_with_node`]: CallbackDescriptor::sync_with_node

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::nodes::TaskNode;

/// Boxed future produced by one callback invocation.
pub type CallbackFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One registered callback: the function plus its injection choice.
#[derive(Clone)]
pub struct CallbackDescriptor {
    call: CallbackCall,
}

#[derive(Clone)]
enum CallbackCall {
    Plain(Arc<dyn Fn() -> CallbackFuture + Send + Sync>),
    WithNode(Arc<dyn Fn(TaskNode) -> CallbackFuture + Send + Sync>),
}

impl CallbackDescriptor {
    /// Wraps an async callback that takes no arguments.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            call: CallbackCall::Plain(Arc::new(move || Box::pin(f()) as CallbackFuture)),
        }
    }

    /// Wraps an async callback that receives the owning [`TaskNode`].
    pub fn with_node<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskNode) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            call: CallbackCall::WithNode(Arc::new(move |node| Box::pin(f(node)) as CallbackFuture)),
        }
    }

    /// Wraps a synchronous callback that takes no arguments.
    ///
    /// The callback runs when the dispatch awaits it, inside the same
    /// panic isolation as async callbacks.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move || {
            let f = Arc::clone(&f);
            async move { (*f)() }
        })
    }

    /// Wraps a synchronous callback that receives the owning [`TaskNode`].
    pub fn sync_with_node<F>(f: F) -> Self
    where
        F: Fn(TaskNode) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::with_node(move |node| {
            let f = Arc::clone(&f);
            async move { (*f)(node) }
        })
    }

    /// True when this callback asked for task-node injection.
    pub fn injects_task_node(&self) -> bool {
        matches!(self.call, CallbackCall::WithNode(_))
    }

    /// Builds the future for one invocation, injecting `node` if requested.
    pub(crate) fn invoke(&self, node: &TaskNode) -> CallbackFuture {
        match &self.call {
            CallbackCall::Plain(f) => (**f)(),
            CallbackCall::WithNode(f) => (**f)(node.clone()),
        }
    }
}

impl std::fmt::Debug for CallbackDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.call {
            CallbackCall::Plain(_) => "plain",
            CallbackCall::WithNode(_) => "with_node",
        };
        f.debug_struct("CallbackDescriptor")
            .field("kind", &kind)
            .finish()
    }
}
