//! # Edge helpers: succession relations on top of the tree.
//!
//! An edge is an `at_job_end` / `at_handler_end` callback that submits the
//! successor once the predecessor drains. Edges may form chains and
//! cycles; the parent/child tree never does, because a successor is always
//! re-parented to the commander root, keeping completion propagation
//! acyclic.
//!
//! - [`add_edge`] unconditional succession.
//! - [`add_conditional_edge`] pick the successor by the predecessor's
//!   result.
//!
//! Handler nodes on either side of an edge are marked `reusable`, so a
//! cycle can activate the same node repeatedly; jobs re-run naturally
//! (each activation spawns a fresh body future).
//!
//! ## Example
//! ```
//! use commandeer::{add_edge, shared_data, Commander, Job, PLEDGE};
//! use serde_json::json;
//!
//! let first = Job::from_fn("first", PLEDGE, |node| async move {
//!     node.with_data(|d| d["steps"].as_array_mut().map(|s| s.push(json!("first"))));
//!     Ok(json!("first"))
//! });
//! let second = Job::from_fn("second", PLEDGE, |node| async move {
//!     node.with_data(|d| d["steps"].as_array_mut().map(|s| s.push(json!("second"))));
//!     Ok(json!("second"))
//! });
//!
//! let data = shared_data(json!({ "steps": [] }));
//! first.set_data(data.clone());
//! add_edge(&first, &second, Some(data.clone()));
//!
//! Commander::new().run(vec![first], true)?;
//! assert_eq!(*data.lock().unwrap(), json!({ "steps": ["first", "second"] }));
//! # Ok::<(), commandeer::RuntimeError>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::callbacks::{CallbackDescriptor, CallbackEvent};
use crate::nodes::{NodeKind, SharedData, TaskNode};

/// Connects `from` to `to`: when `from` drains, `to` is submitted under
/// the commander root.
///
/// `data`, when given, is assigned to `to` immediately so the successor
/// shares the predecessor's context. A handler successor is marked
/// reusable so the edge may fire more than once.
pub fn add_edge(from: &TaskNode, to: &TaskNode, data: Option<SharedData>) {
    mark_reusable(from);
    if let Some(data) = &data {
        to.set_data(data.clone());
    }

    let successor = to.clone();
    from.add_callback_functions(
        end_event(from),
        [CallbackDescriptor::with_node(move |node: TaskNode| {
            let successor = successor.clone();
            async move {
                submit_successor(&node, &successor).await;
            }
        })],
    );
}

/// Connects `from` to one of several successors, chosen by `from`'s
/// result.
///
/// The result must be a string key of `map`; unknown keys and non-string
/// results submit nothing. `data`, when given, is assigned to the chosen
/// successor at fire time.
pub fn add_conditional_edge(
    from: &TaskNode,
    map: HashMap<String, TaskNode>,
    data: Option<SharedData>,
) {
    mark_reusable(from);

    let map = Arc::new(map);
    from.add_callback_functions(
        end_event(from),
        [CallbackDescriptor::with_node(move |node: TaskNode| {
            let map = Arc::clone(&map);
            let data = data.clone();
            async move {
                let result = node.result();
                let Some(key) = result.as_str() else {
                    return;
                };
                let Some(successor) = map.get(key) else {
                    return;
                };
                if let Some(data) = &data {
                    successor.set_data(data.clone());
                }
                submit_successor(&node, successor).await;
            }
        })],
    );
}

fn end_event(node: &TaskNode) -> CallbackEvent {
    match node.inner_arc().kind() {
        NodeKind::Handler => CallbackEvent::AtHandlerEnd,
        _ => CallbackEvent::AtJobEnd,
    }
}

fn mark_reusable(node: &TaskNode) {
    if node.inner_arc().kind() == NodeKind::Handler {
        node.inner_arc().set_reusable(true);
    }
}

/// Re-readies and submits the successor under the commander root.
async fn submit_successor(from: &TaskNode, to: &TaskNode) {
    let Some(core) = from.inner_arc().commander_core() else {
        tracing::warn!(task = %from.name(), "edge fired on a node with no commander");
        return;
    };
    mark_reusable(to);
    if let Err(error) = core.submit(to.inner_arc(), core.root()).await {
        tracing::warn!(
            from = %from.name(),
            to = %to.name(),
            error = %error,
            "edge submission failed"
        );
    }
}
