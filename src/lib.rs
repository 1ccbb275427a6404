//! # commandeer
//!
//! **Commandeer** is an in-process task-flow orchestration library.
//!
//! A client declares two kinds of work — [`Job`]s (coarse, queue-scheduled
//! units) and [`HandlerCoroutine`]s (fine, directly invoked, awaitable
//! continuations) — plus callbacks attached to lifecycle events. A
//! long-lived [`Commander`] executes them concurrently under a cooperative
//! single-loop scheduler, tracks parent/child relationships as a tree,
//! propagates completion upward, surfaces failures, and terminates cleanly
//! on request or when the tree drains.
//!
//! ## Features
//!
//! | Area            | Description                                                      | Key types / traits                         |
//! |-----------------|------------------------------------------------------------------|--------------------------------------------|
//! | **Commander**   | The loop: FIFO job dispatch, shutdown, thread-safe submission.   | [`Commander`], [`Config`]                  |
//! | **Task tree**   | Identity, parent/child links, lifecycle, completion propagation. | [`TaskNode`], [`NodeState`], [`NodeId`]    |
//! | **Work**        | Define bodies as closures or trait impls; fresh future per run.  | [`Work`], [`WorkFn`], [`PLEDGE`]           |
//! | **Callbacks**   | Hook lifecycle events, sync or async, with node injection.       | [`CallbackDescriptor`], [`CallbackEvent`]  |
//! | **Edges**       | Succession graphs (chains, conditions, cycles) atop the tree.    | [`add_edge`], [`add_conditional_edge`]     |
//! | **Errors**      | Typed errors for orchestration misuse and body failures.         | [`RuntimeError`], [`TaskError`]            |
//!
//! ## Example
//!
//! ```rust
//! use commandeer::{Commander, HandlerCoroutine, Job, PLEDGE};
//! use serde_json::json;
//!
//! let job = Job::from_fn("fan-out", PLEDGE, |node| async move {
//!     let double = HandlerCoroutine::from_fn("double", PLEDGE, |handler| async move {
//!         let n = handler.data().and_then(|d| d.lock().ok().and_then(|v| v.as_i64()));
//!         Ok(json!(n.unwrap_or(0) * 2))
//!     });
//!     double.set_data(commandeer::shared_data(json!(21)));
//!
//!     let double = node.call_handler(&double).map_err(commandeer::TaskError::failed)?;
//!     double.wait().await
//! });
//!
//! let commander = Commander::new();
//! let value = commander.run(vec![job.clone()], true)?;
//! assert_eq!(value, json!(42));
//! assert_eq!(job.result(), json!(42));
//! # Ok::<(), commandeer::RuntimeError>(())
//! ```
//!
//! ## Scheduling model
//!
//! Single-threaded cooperative within one commander: one loop, one logical
//! execution context, many concurrently suspended bodies. Bodies progress
//! only at suspension points; authors are contractually forbidden to block
//! the scheduling thread (the [`PLEDGE`] constant codifies this). Foreign
//! threads hand work to the loop through the `*_threadsafe` methods.
//!
//! Multiple commanders may coexist in one process; there is no
//! module-level mutable state.
//!
//! ---

mod callbacks;
mod config;
mod core;
mod edges;
mod error;
mod nodes;

// ---- Public re-exports ----

pub use callbacks::{CallbackDescriptor, CallbackEvent, CallbackFuture, CallbackRegistry};
pub use config::Config;
pub use core::Commander;
pub use edges::{add_conditional_edge, add_edge};
pub use error::{RuntimeError, TaskError};
pub use nodes::{
    shared_data, HandlerCoroutine, Job, NodeId, NodeState, SharedData, TaskNode, Work, WorkFn,
    WorkFuture, WorkRef, PLEDGE,
};

/// The dynamic value type flowing through results, data slots, and exit
/// values (re-exported from `serde_json`).
pub use serde_json::Value;
