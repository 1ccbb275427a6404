//! Task nodes: the tree core, lifecycle states, and the two unit kinds.
//!
//! - [`TaskNode`] cloneable handle over the shared node core.
//! - [`Job`] coarse, queue-scheduled unit.
//! - [`HandlerCoroutine`] fine, directly invoked, awaitable unit.
//! - [`Work`] / [`WorkFn`] the body contract both kinds share.

mod handler;
mod job;
mod node;
mod state;
mod work;

pub use handler::HandlerCoroutine;
pub use job::Job;
pub use node::{shared_data, SharedData, TaskNode};
pub use state::{NodeId, NodeState};
pub use work::{Work, WorkFn, WorkFuture, WorkRef, PLEDGE};

pub(crate) use node::{lock, NodeInner};
pub(crate) use state::NodeKind;
