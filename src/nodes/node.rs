//! # The task-node tree.
//!
//! Every schedulable unit — the commander root, each job, each handler —
//! is a node in one tree. [`NodeInner`] is the shared core (identity,
//! parent/child links, lifecycle state, result and exception slots,
//! callbacks, cancellation); [`TaskNode`] is the cloneable public handle
//! over it, handed to bodies as their self-reference and injected into
//! callbacks that ask for it.
//!
//! ## Tree rules
//! - A node has exactly one parent per activation; children are recorded
//!   in creation order and removed only when the child is terminal.
//! - Cancellation tokens are derived parent → child at attachment, so
//!   terminating a node terminates its whole subtree cooperatively.
//! - A node is terminal iff its body returned, every child is terminal,
//!   and its terminal-phase callbacks have been dispatched; sealing is
//!   monotonic and happens at most once per activation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::callbacks::{CallbackDescriptor, CallbackEvent, CallbackRegistry};
use crate::core::CommanderCore;
use crate::error::{RuntimeError, TaskError};
use crate::nodes::state::{NodeId, NodeKind, NodeState};
use crate::nodes::work::WorkRef;
use crate::nodes::{HandlerCoroutine, Job};

/// Shared mutable context threaded between nodes by the edge helpers.
///
/// Edge-connected nodes hold the *same* allocation, so writes made by one
/// node are observed by its successors. The core neither copies nor
/// interprets the value.
pub type SharedData = Arc<Mutex<Value>>;

/// Creates a [`SharedData`] slot holding `value`.
pub fn shared_data(value: Value) -> SharedData {
    Arc::new(Mutex::new(value))
}

/// Locks a mutex, recovering the guard if a panicking callback poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Link from a node to its parent.
pub(crate) enum ParentLink {
    /// Not attached yet.
    Unset,
    /// The commander root's parent slot.
    Null,
    /// An ordinary tree link.
    Node(Weak<NodeInner>),
}

/// Shared core of every task node.
pub(crate) struct NodeInner {
    kind: NodeKind,
    work: Option<WorkRef>,
    /// Handlers only: whether the node may be restarted after sealing.
    reusable: AtomicBool,
    /// Claimed when the node is queued, spawned, or awaited inline.
    scheduled: AtomicBool,
    /// Set once the body returned, failed, or was terminated.
    body_done: AtomicBool,
    /// Set once the terminal phase ran; guards double-sealing.
    sealed: AtomicBool,
    id: Mutex<Option<NodeId>>,
    state: Mutex<NodeState>,
    result: Mutex<Value>,
    exception: Mutex<Option<TaskError>>,
    callbacks: Mutex<CallbackRegistry>,
    data: Mutex<Option<SharedData>>,
    parent: Mutex<ParentLink>,
    children: Mutex<Vec<Arc<NodeInner>>>,
    cancel: Mutex<CancellationToken>,
    commander: Mutex<Weak<CommanderCore>>,
    finished: watch::Sender<bool>,
}

impl NodeInner {
    pub(crate) fn new(kind: NodeKind, work: Option<WorkRef>) -> Arc<Self> {
        let (finished, _) = watch::channel(false);
        Arc::new(Self {
            kind,
            work,
            reusable: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
            body_done: AtomicBool::new(false),
            sealed: AtomicBool::new(false),
            id: Mutex::new(None),
            state: Mutex::new(NodeState::Pending),
            result: Mutex::new(Value::Null),
            exception: Mutex::new(None),
            callbacks: Mutex::new(CallbackRegistry::new()),
            data: Mutex::new(None),
            parent: Mutex::new(ParentLink::Unset),
            children: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
            commander: Mutex::new(Weak::new()),
            finished,
        })
    }

    /// Creates the commander root node and binds it to its core.
    pub(crate) fn new_root(core: Weak<CommanderCore>) -> Arc<Self> {
        let root = Self::new(NodeKind::Commander, None);
        *lock(&root.parent) = ParentLink::Null;
        *lock(&root.commander) = core;
        *lock(&root.id) = Some(NodeId::Seq(0));
        root
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn work(&self) -> Option<WorkRef> {
        self.work.clone()
    }

    pub(crate) fn name(&self) -> String {
        match (&self.work, self.kind) {
            (Some(work), _) => work.name().to_string(),
            (None, NodeKind::Commander) => "commander".to_string(),
            (None, _) => "<unnamed>".to_string(),
        }
    }

    pub(crate) fn state(&self) -> NodeState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: NodeState) {
        *lock(&self.state) = state;
    }

    pub(crate) fn result(&self) -> Value {
        lock(&self.result).clone()
    }

    pub(crate) fn set_result(&self, value: Value) {
        *lock(&self.result) = value;
    }

    pub(crate) fn exception(&self) -> Option<TaskError> {
        lock(&self.exception).clone()
    }

    pub(crate) fn set_exception(&self, error: TaskError) {
        *lock(&self.exception) = Some(error);
    }

    pub(crate) fn id(&self) -> Option<NodeId> {
        lock(&self.id).clone()
    }

    /// Assigns a sequence id unless the node was named explicitly.
    pub(crate) fn assign_seq_id(&self, seq: u64) {
        let mut id = lock(&self.id);
        if id.is_none() {
            *id = Some(NodeId::Seq(seq));
        }
    }

    pub(crate) fn set_name_id(&self, name: String) {
        *lock(&self.id) = Some(NodeId::Name(name));
    }

    pub(crate) fn data(&self) -> Option<SharedData> {
        lock(&self.data).clone()
    }

    pub(crate) fn set_data(&self, data: SharedData) {
        *lock(&self.data) = Some(data);
    }

    pub(crate) fn is_reusable(&self) -> bool {
        self.reusable.load(Ordering::SeqCst)
    }

    pub(crate) fn set_reusable(&self, reusable: bool) {
        self.reusable.store(reusable, Ordering::SeqCst);
    }

    pub(crate) fn is_body_done(&self) -> bool {
        self.body_done.load(Ordering::SeqCst)
    }

    /// Marks the body as returned and wakes everyone awaiting the node.
    pub(crate) fn mark_body_done(&self) {
        self.body_done.store(true, Ordering::SeqCst);
        self.finished.send_replace(true);
    }

    pub(crate) fn finished_rx(&self) -> watch::Receiver<bool> {
        self.finished.subscribe()
    }

    /// Claims the terminal phase; returns `false` if already sealed.
    pub(crate) fn seal(&self) -> bool {
        !self.sealed.swap(true, Ordering::SeqCst)
    }

    /// Claims the node for one activation; used by the inline-await path.
    pub(crate) fn claim_unscheduled(&self) -> bool {
        !self.scheduled.swap(true, Ordering::SeqCst)
    }

    /// Releases a claim after a submission that could not be delivered.
    pub(crate) fn release_claim(&self) {
        self.scheduled.store(false, Ordering::SeqCst);
    }

    /// Installs a fresh cancellation token (session start on the root).
    pub(crate) fn reset_cancel(&self) {
        *lock(&self.cancel) = CancellationToken::new();
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        lock(&self.cancel).clone()
    }

    pub(crate) fn cancel(&self) {
        lock(&self.cancel).cancel();
    }

    pub(crate) fn commander_core(&self) -> Option<Arc<CommanderCore>> {
        lock(&self.commander).upgrade()
    }

    pub(crate) fn callbacks(&self) -> MutexGuard<'_, CallbackRegistry> {
        lock(&self.callbacks)
    }

    pub(crate) fn parent_node(&self) -> Option<Arc<NodeInner>> {
        match &*lock(&self.parent) {
            ParentLink::Node(weak) => weak.upgrade(),
            ParentLink::Null | ParentLink::Unset => None,
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        !matches!(&*lock(&self.parent), ParentLink::Unset)
    }

    pub(crate) fn children_is_empty(&self) -> bool {
        lock(&self.children).is_empty()
    }

    pub(crate) fn children_snapshot(&self) -> Vec<Arc<NodeInner>> {
        lock(&self.children).clone()
    }

    /// Attaches `child` under `parent`: parent link, derived cancellation
    /// token, and inherited commander binding.
    pub(crate) fn add_child(parent: &Arc<NodeInner>, child: &Arc<NodeInner>) {
        {
            let mut link = lock(&child.parent);
            *link = ParentLink::Node(Arc::downgrade(parent));
        }
        {
            let mut commander = lock(&child.commander);
            *commander = lock(&parent.commander).clone();
        }
        {
            let parent_token = lock(&parent.cancel).clone();
            *lock(&child.cancel) = parent_token.child_token();
        }
        lock(&parent.children).push(Arc::clone(child));
    }

    /// Removes `child` from the child list; tolerates a child that is
    /// already gone (it may have been drained by a terminate).
    pub(crate) fn remove_child(&self, child: &Arc<NodeInner>) {
        lock(&self.children).retain(|existing| !Arc::ptr_eq(existing, child));
    }

    /// Collects the names of this node's live descendants (stuck-node
    /// reporting during shutdown).
    pub(crate) fn descendant_names(&self, out: &mut Vec<String>) {
        let children = self.children_snapshot();
        for child in children {
            out.push(child.name());
            child.descendant_names(out);
        }
    }

    /// Readies the node for one activation.
    ///
    /// A pending node is claimed; a terminal node is reset (handlers only
    /// when marked reusable); a queued or running node is rejected.
    ///
    /// # Panics
    /// A terminal node being restarted must have an empty child set.
    pub(crate) fn prepare_for_start(&self) -> Result<(), RuntimeError> {
        let mut state = lock(&self.state);
        match *state {
            NodeState::Pending => {
                if self.scheduled.swap(true, Ordering::SeqCst) {
                    return Err(RuntimeError::AlreadyScheduled { node: self.name() });
                }
                Ok(())
            }
            NodeState::Running => Err(RuntimeError::AlreadyScheduled { node: self.name() }),
            NodeState::Done | NodeState::Failed | NodeState::Terminated => {
                if self.kind == NodeKind::Handler && !self.is_reusable() {
                    return Err(RuntimeError::HandlerNotReusable { node: self.name() });
                }
                assert!(
                    self.children_is_empty(),
                    "restarted node '{}' must have an empty child set",
                    self.name()
                );
                *state = NodeState::Pending;
                *lock(&self.result) = Value::Null;
                *lock(&self.exception) = None;
                *lock(&self.cancel) = CancellationToken::new();
                self.body_done.store(false, Ordering::SeqCst);
                self.sealed.store(false, Ordering::SeqCst);
                self.scheduled.store(true, Ordering::SeqCst);
                self.finished.send_replace(false);
                Ok(())
            }
        }
    }
}

/// Cloneable handle to a node in the task tree.
///
/// Bodies receive their own `TaskNode` as the self-reference; callbacks
/// constructed with `with_node` receive the owning node. All accessors are
/// cheap snapshots of the shared core.
#[derive(Clone)]
pub struct TaskNode {
    pub(crate) inner: Arc<NodeInner>,
}

impl TaskNode {
    pub(crate) fn from_arc(inner: Arc<NodeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner_arc(&self) -> &Arc<NodeInner> {
        &self.inner
    }

    /// The node's name: its work name, or `"commander"` for the root.
    pub fn name(&self) -> String {
        self.inner.name()
    }

    /// The node's identity, `None` until it is scheduled or named.
    pub fn id(&self) -> Option<NodeId> {
        self.inner.id()
    }

    /// Names the node explicitly; named nodes are never renumbered.
    pub fn set_id(&self, name: impl Into<String>) {
        self.inner.set_name_id(name.into());
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.inner.state()
    }

    /// True once the node reached `Done`, `Failed`, or `Terminated`.
    pub fn is_terminal(&self) -> bool {
        self.inner.state().is_terminal()
    }

    /// The body's return value; `Null` until the body returns.
    pub fn result(&self) -> Value {
        self.inner.result()
    }

    /// The stored failure, `Some` iff the node is `Failed`.
    pub fn exception(&self) -> Option<TaskError> {
        self.inner.exception()
    }

    /// The shared data slot, if one was assigned.
    pub fn data(&self) -> Option<SharedData> {
        self.inner.data()
    }

    /// Assigns the shared data slot.
    pub fn set_data(&self, data: SharedData) {
        self.inner.set_data(data);
    }

    /// Runs `f` against the shared data value, if a slot is assigned.
    pub fn with_data<R>(&self, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let data = self.inner.data()?;
        let mut guard = lock(&data);
        Some(f(&mut guard))
    }

    /// Snapshot of the node's live children, in creation order.
    pub fn children(&self) -> Vec<TaskNode> {
        self.inner
            .children_snapshot()
            .into_iter()
            .map(TaskNode::from_arc)
            .collect()
    }

    /// Number of live children.
    pub fn children_num(&self) -> usize {
        self.inner.children_snapshot().len()
    }

    /// The node's parent, `None` for the root and for detached nodes.
    pub fn parent(&self) -> Option<TaskNode> {
        self.inner.parent_node().map(TaskNode::from_arc)
    }

    /// The chain parent, grandparent, …, up to the commander root.
    pub fn ancestor_chain(&self) -> Vec<TaskNode> {
        let mut chain = Vec::new();
        let mut current = self.inner.parent_node();
        while let Some(node) = current {
            current = node.parent_node();
            chain.push(TaskNode::from_arc(node));
        }
        chain
    }

    /// True once the node's subtree has been asked to terminate.
    ///
    /// Long bodies may poll this between suspension points.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel_token().is_cancelled()
    }

    /// Registers callbacks for a lifecycle event, preserving order.
    ///
    /// Accepts a single descriptor (`[descriptor]`) or any ordered
    /// collection of them.
    pub fn add_callback_functions(
        &self,
        which: CallbackEvent,
        functions_info: impl IntoIterator<Item = CallbackDescriptor>,
    ) {
        self.inner.callbacks().extend(which, functions_info);
    }

    /// Enqueues `job` on the owning commander with this node as parent.
    ///
    /// Suspends while a bounded queue is full. A terminated parent makes
    /// this a no-op.
    pub async fn put_job(&self, job: &Job) -> Result<(), RuntimeError> {
        let core = self.require_commander()?;
        core.submit_job(job.task_node().inner_arc(), &self.inner).await
    }

    /// Starts `handler` immediately on the owning commander with this node
    /// as parent, returning the awaitable handle back.
    pub fn call_handler(&self, handler: &HandlerCoroutine) -> Result<HandlerCoroutine, RuntimeError> {
        let core = self.require_commander()?;
        core.submit_handler(handler.task_node().inner_arc(), &self.inner)?;
        Ok(handler.clone())
    }

    /// Requests commander shutdown from within a body.
    ///
    /// The loop stops accepting work, cancels running bodies at their next
    /// suspension point, and `run` returns `return_result`.
    pub fn exit_commander(&self, return_result: Value) -> Result<(), RuntimeError> {
        let core = self.require_commander()?;
        core.request_exit(return_result);
        Ok(())
    }

    /// The commander managing this node, once it has been scheduled under
    /// one.
    pub fn commander(&self) -> Option<crate::core::Commander> {
        self.inner
            .commander_core()
            .map(crate::core::Commander::from_core)
    }

    pub(crate) fn callbacks_for(&self, event: CallbackEvent) -> Vec<CallbackDescriptor> {
        self.inner.callbacks().get(event).to_vec()
    }

    pub(crate) fn require_commander(&self) -> Result<Arc<CommanderCore>, RuntimeError> {
        self.inner
            .commander_core()
            .ok_or_else(|| RuntimeError::NoCommander {
                node: self.inner.name(),
            })
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
