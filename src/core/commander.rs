//! # Commander: the scheduling authority and its event loop.
//!
//! One commander owns one cooperative loop: a current-thread runtime built
//! inside [`Commander::run`], a FIFO job queue, a threadsafe bridge for
//! foreign threads, and the root of the task-node tree.
//!
//! ## Architecture
//! ```text
//! Commander::run(jobs, auto_exit)
//!     │
//!     ├──► seed queue with initial jobs (root as parent)
//!     │
//!     └──► loop {
//!            ├─► auto_exit && is_empty()        → drain & return
//!            ├─► shutdown token cancelled       → drain & return
//!            ├─► bridge submission              → attach root, enqueue/spawn
//!            ├─► dequeued job                   → spawn body (runner::drive)
//!            └─► completion wakeup              → re-check empty
//!          }
//!
//! drain:
//!     cancel root token → bodies terminate at next suspension point
//!     terminate still-queued jobs (at_terminate, unlink)
//!     wait for spawned bodies, bounded by Config::grace
//!     fire at_commander_end → return exit value
//! ```
//!
//! ## Rules
//! - Jobs dequeue strictly FIFO; handlers never queue.
//! - Bodies are spawned, never awaited inline by the loop: one slow body
//!   cannot stall dispatch.
//! - Within one commander only one body runs at a time (single logical
//!   execution context); ordinary in-loop state needs no locking.
//! - The queue depth, root child set, and bridge pending count together
//!   define `is_empty`; the bridge records a submission before the call
//!   returns, so emptiness cannot flicker while work is in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::callbacks::{dispatch, CallbackEvent};
use crate::config::Config;
use crate::core::bridge::{self, Bridge, BridgeRx, Submission};
use crate::core::queue::{self, JobQueue, JobQueueRx};
use crate::core::runner::{drive, terminate_unstarted};
use crate::error::RuntimeError;
use crate::nodes::{lock, HandlerCoroutine, Job, NodeInner, NodeKind, NodeState, TaskNode};

/// Per-run channels and shutdown machinery; rebuilt on every `run`.
struct Session {
    queue: JobQueue<TaskNode>,
    bridge: Bridge,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Blocks foreign threads until the loop has returned.
struct ExitGate {
    active: Mutex<bool>,
    cv: Condvar,
}

impl ExitGate {
    fn new() -> Self {
        Self {
            active: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn close(&self) {
        *lock(&self.active) = true;
    }

    fn open(&self) {
        *lock(&self.active) = false;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut guard = lock(&self.active);
        while *guard {
            guard = self
                .cv
                .wait(guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// Shared state behind every [`Commander`] handle.
pub(crate) struct CommanderCore {
    cfg: Config,
    root: Arc<NodeInner>,
    next_id: AtomicU64,
    running: Mutex<bool>,
    session: Mutex<Option<Session>>,
    return_result: Mutex<Option<Value>>,
    last_result: Mutex<Value>,
    end_nodes: Mutex<Vec<TaskNode>>,
    empty_wakeup: Notify,
    gate: ExitGate,
}

impl CommanderCore {
    pub(crate) fn root(&self) -> &Arc<NodeInner> {
        &self.root
    }

    /// Assigns the next sequence id unless the node was named explicitly.
    pub(crate) fn assign_id(&self, node: &Arc<NodeInner>) {
        node.assign_seq_id(self.next_id.fetch_add(1, Ordering::SeqCst));
    }

    /// True iff the queue, the root child set, and the bridge are all empty.
    pub(crate) fn is_empty(&self) -> bool {
        let (queue_depth, bridge_pending) = match &*lock(&self.session) {
            Some(session) => (session.queue.depth(), session.bridge.pending()),
            None => (0, 0),
        };
        queue_depth == 0 && bridge_pending == 0 && self.root.children_is_empty()
    }

    /// Submits a node under `parent`, dispatching on its kind.
    pub(crate) async fn submit(
        &self,
        node: &Arc<NodeInner>,
        parent: &Arc<NodeInner>,
    ) -> Result<(), RuntimeError> {
        match node.kind() {
            NodeKind::Job => self.submit_job(node, parent).await,
            NodeKind::Handler => self.submit_handler(node, parent),
            NodeKind::Commander => Ok(()),
        }
    }

    /// Attaches a job to `parent` and enqueues it (FIFO).
    ///
    /// Suspends while a bounded queue is full. A terminated parent makes
    /// this a silent no-op, mirroring termination's detach semantics.
    pub(crate) async fn submit_job(
        &self,
        node: &Arc<NodeInner>,
        parent: &Arc<NodeInner>,
    ) -> Result<(), RuntimeError> {
        let queue = self.queue_handle()?;
        if parent.state() == NodeState::Terminated {
            tracing::debug!(task = %node.name(), "dropping job under terminated parent");
            return Ok(());
        }
        node.prepare_for_start()?;
        NodeInner::add_child(parent, node);
        if !queue.push(TaskNode::from_arc(Arc::clone(node))).await {
            parent.remove_child(node);
            node.release_claim();
            return Err(RuntimeError::NotRunning);
        }
        Ok(())
    }

    /// Attaches a handler to `parent` and starts its body immediately.
    pub(crate) fn submit_handler(
        &self,
        node: &Arc<NodeInner>,
        parent: &Arc<NodeInner>,
    ) -> Result<(), RuntimeError> {
        let tracker = self.tracker_handle()?;
        if parent.state() == NodeState::Terminated {
            tracing::debug!(task = %node.name(), "dropping handler under terminated parent");
            return Ok(());
        }
        node.prepare_for_start()?;
        NodeInner::add_child(parent, node);
        self.assign_id(node);
        let task_node = TaskNode::from_arc(Arc::clone(node));
        self.collect_end_node(&task_node);
        tracker.spawn(drive(task_node));
        Ok(())
    }

    /// Records an explicit exit request and wakes the loop.
    pub(crate) fn request_exit(&self, return_result: Value) {
        let running = lock(&self.running);
        *lock(&self.return_result) = Some(return_result);
        if !*running {
            return;
        }
        if let Some(session) = &*lock(&self.session) {
            session.shutdown.cancel();
        }
    }

    /// Called by completion propagation when a top-level node seals.
    pub(crate) fn note_top_level_sealed(&self, node: &TaskNode) {
        if node.state() == NodeState::Done {
            *lock(&self.last_result) = node.result();
        }
        self.empty_wakeup.notify_one();
    }

    fn queue_handle(&self) -> Result<JobQueue<TaskNode>, RuntimeError> {
        lock(&self.session)
            .as_ref()
            .map(|session| session.queue.clone())
            .ok_or(RuntimeError::NotRunning)
    }

    fn bridge_handle(&self) -> Result<Bridge, RuntimeError> {
        lock(&self.session)
            .as_ref()
            .map(|session| session.bridge.clone())
            .ok_or(RuntimeError::NotRunning)
    }

    fn tracker_handle(&self) -> Result<TaskTracker, RuntimeError> {
        lock(&self.session)
            .as_ref()
            .map(|session| session.tracker.clone())
            .ok_or(RuntimeError::NotRunning)
    }

    /// Registers a node whose `at_commander_end` callbacks fire at loop end.
    fn collect_end_node(&self, node: &TaskNode) {
        if !node.inner_arc().callbacks().has(CallbackEvent::AtCommanderEnd) {
            return;
        }
        let mut nodes = lock(&self.end_nodes);
        let seen = nodes
            .iter()
            .any(|existing| Arc::ptr_eq(existing.inner_arc(), node.inner_arc()));
        if !seen {
            nodes.push(node.clone());
        }
    }

    /// Dequeued job: assign id, register end callbacks, spawn the body.
    fn dispatch_job(&self, node: TaskNode) {
        self.assign_id(node.inner_arc());
        self.collect_end_node(&node);
        if let Ok(tracker) = self.tracker_handle() {
            tracker.spawn(drive(node));
        }
    }

    /// Materializes one bridge submission under the root.
    ///
    /// Jobs are attached+enqueued on a tracked task so a full bounded
    /// queue never stalls the loop itself; handlers start synchronously.
    /// The bridge entry settles only after materialization.
    fn materialize(&self, submission: Submission) {
        match submission {
            Submission::Job(job) => {
                let Ok(tracker) = self.tracker_handle() else {
                    self.settle_bridge();
                    return;
                };
                let Some(core) = self.root.commander_core() else {
                    self.settle_bridge();
                    return;
                };
                tracker.spawn(async move {
                    let result = core
                        .submit_job(job.task_node().inner_arc(), core.root())
                        .await;
                    if let Err(error) = result {
                        tracing::warn!(task = %job.name(), error = %error, "threadsafe job rejected");
                    }
                    core.settle_bridge();
                    core.empty_wakeup.notify_one();
                });
            }
            Submission::Handler(handler) => {
                let result = self.submit_handler(handler.task_node().inner_arc(), self.root());
                if let Err(error) = result {
                    tracing::warn!(task = %handler.name(), error = %error, "threadsafe handler rejected");
                }
                self.settle_bridge();
                self.empty_wakeup.notify_one();
            }
        }
    }

    fn settle_bridge(&self) {
        if let Ok(bridge) = self.bridge_handle() {
            bridge.settle();
        }
    }

    /// The exit value `run` returns: the explicit exit result when one was
    /// supplied, otherwise the most recent top-level completion's result.
    fn exit_value(&self) -> Value {
        match lock(&self.return_result).clone() {
            Some(value) => value,
            None => lock(&self.last_result).clone(),
        }
    }

    fn begin_session(
        &self,
    ) -> Result<(JobQueueRx<TaskNode>, BridgeRx, CancellationToken), RuntimeError> {
        let mut running = lock(&self.running);
        if *running {
            return Err(RuntimeError::AlreadyRunning);
        }
        *running = true;
        self.gate.close();

        let (queue_tx, queue_rx) = queue::channel(self.cfg.queue_capacity);
        let (bridge_tx, bridge_rx) = bridge::channel();
        let shutdown = CancellationToken::new();

        self.root.reset_cancel();
        self.root.set_state(NodeState::Running);
        *lock(&self.return_result) = None;
        *lock(&self.last_result) = Value::Null;
        lock(&self.end_nodes).clear();
        *lock(&self.session) = Some(Session {
            queue: queue_tx,
            bridge: bridge_tx,
            shutdown: shutdown.clone(),
            tracker: TaskTracker::new(),
        });
        Ok((queue_rx, bridge_rx, shutdown))
    }

    fn end_session(&self) {
        let mut running = lock(&self.running);
        *lock(&self.session) = None;
        *running = false;
        drop(running);
        self.gate.open();
    }

    /// Stops intake, terminates the tree, and waits for bodies to drain.
    async fn shutdown_phase(
        &self,
        queue_rx: &mut JobQueueRx<TaskNode>,
        bridge_rx: &mut BridgeRx,
    ) -> Result<(), RuntimeError> {
        tracing::debug!("commander loop draining");
        queue_rx.close();
        bridge_rx.close();
        self.root.cancel();

        while let Some(node) = queue_rx.try_recv() {
            terminate_unstarted(node).await;
        }
        while let Some(submission) = bridge_rx.try_recv() {
            let name = match &submission {
                Submission::Job(job) => job.name(),
                Submission::Handler(handler) => handler.name(),
            };
            tracing::debug!(task = %name, "discarding unmaterialized submission");
            self.settle_bridge();
        }

        let tracker = self.tracker_handle()?;
        tracker.close();
        let grace = self.cfg.grace;
        if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
            let stuck = self.stuck_names();
            self.root.set_state(NodeState::Failed);
            tracing::error!(?grace, ?stuck, "shutdown grace exceeded");
            return Err(RuntimeError::GraceExceeded { grace, stuck });
        }
        Ok(())
    }

    /// Fires `at_commander_end`: the root's own callbacks first, then the
    /// scheduled nodes that registered one, in collection order.
    async fn fire_commander_end(&self) {
        let root = TaskNode::from_arc(Arc::clone(&self.root));
        dispatch(&root, CallbackEvent::AtCommanderEnd).await;

        let nodes = std::mem::take(&mut *lock(&self.end_nodes));
        for node in nodes {
            dispatch(&node, CallbackEvent::AtCommanderEnd).await;
        }
        tracing::debug!("commander loop finished");
    }

    fn stuck_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.root.descendant_names(&mut names);
        names.sort_unstable();
        names
    }
}

/// The commander loop body; runs on the owned current-thread runtime.
async fn event_loop(
    core: Arc<CommanderCore>,
    mut queue_rx: JobQueueRx<TaskNode>,
    mut bridge_rx: BridgeRx,
    jobs: Vec<Job>,
    auto_exit: bool,
    shutdown: CancellationToken,
) -> Result<(), RuntimeError> {
    tracing::debug!(auto_exit, "commander loop started");
    for job in &jobs {
        core.submit_job(job.task_node().inner_arc(), core.root()).await?;
    }
    drop(jobs);

    loop {
        if auto_exit && core.is_empty() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(submission) = bridge_rx.recv() => core.materialize(submission),
            Some(node) = queue_rx.recv() => core.dispatch_job(node),
            _ = core.empty_wakeup.notified(), if auto_exit => {}
        }
    }

    core.shutdown_phase(&mut queue_rx, &mut bridge_rx).await
}

/// The single scheduling authority: root of the task tree, owner of the
/// job queue and the loop.
///
/// A `Commander` value is a cheap cloneable handle; clones share the same
/// loop and may live on any thread. In-loop submissions go through
/// [`put_job`](Commander::put_job) / [`call_handler`](Commander::call_handler)
/// (or the equivalents on [`TaskNode`]); foreign threads use the
/// `*_threadsafe` variants.
///
/// ## Example
/// ```
/// use commandeer::{Commander, Job, PLEDGE};
/// use serde_json::json;
///
/// let commander = Commander::new();
/// let job = Job::from_fn("echo", PLEDGE, |_node| async move { Ok(json!(42)) });
///
/// let value = commander.run(vec![job.clone()], true)?;
/// assert_eq!(value, json!(42));
/// assert_eq!(job.result(), json!(42));
/// assert!(commander.is_empty());
/// # Ok::<(), commandeer::RuntimeError>(())
/// ```
#[derive(Clone)]
pub struct Commander {
    core: Arc<CommanderCore>,
}

impl Commander {
    /// Creates a commander with the default [`Config`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a commander with an explicit configuration.
    pub fn with_config(cfg: Config) -> Self {
        let core = Arc::new_cyclic(|weak: &Weak<CommanderCore>| CommanderCore {
            cfg,
            root: NodeInner::new_root(weak.clone()),
            next_id: AtomicU64::new(1),
            running: Mutex::new(false),
            session: Mutex::new(None),
            return_result: Mutex::new(None),
            last_result: Mutex::new(Value::Null),
            end_nodes: Mutex::new(Vec::new()),
            empty_wakeup: Notify::new(),
            gate: ExitGate::new(),
        });
        Self { core }
    }

    pub(crate) fn from_core(core: Arc<CommanderCore>) -> Self {
        Self { core }
    }

    /// Starts the loop in the calling thread and blocks until it exits.
    ///
    /// `jobs` are enqueued in order with the commander as parent. With
    /// `auto_exit`, the loop returns once the queue, the tree, and the
    /// bridge are all empty; otherwise it runs until [`exit`](Self::exit)
    /// or a body's `exit_commander`.
    ///
    /// Returns the exit value: the result passed to the shutdown that
    /// ended the loop, or — on an `auto_exit` drain with no explicit
    /// value — the most recent top-level completion's result (`Null` when
    /// nothing completed).
    ///
    /// With a bounded queue, size `queue_capacity` at least as large as
    /// the initial batch; seeding suspends when the queue fills.
    ///
    /// # Errors
    /// [`RuntimeError::AlreadyRunning`] if this commander's loop is
    /// already running; [`RuntimeError::GraceExceeded`] if shutdown could
    /// not drain the tree within [`Config::grace`].
    pub fn run(&self, jobs: Vec<Job>, auto_exit: bool) -> Result<Value, RuntimeError> {
        self.run_loop(jobs, auto_exit)
    }

    /// Runs the loop, or delegates to the one already running.
    ///
    /// Returns `Ok(Some(value))` after running a loop to completion, or
    /// `Ok(None)` when the jobs were handed to an existing loop through
    /// the threadsafe bridge.
    pub fn run_auto(
        &self,
        jobs: Vec<Job>,
        auto_exit: bool,
    ) -> Result<Option<Value>, RuntimeError> {
        match self.run_loop(jobs.clone(), auto_exit) {
            Ok(value) => Ok(Some(value)),
            Err(RuntimeError::AlreadyRunning) => {
                for job in &jobs {
                    self.put_job_threadsafe(job)?;
                }
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Enqueues a job with the commander root as parent (in-loop form).
    pub async fn put_job(&self, job: &Job) -> Result<(), RuntimeError> {
        self.core
            .submit_job(job.task_node().inner_arc(), self.core.root())
            .await
    }

    /// Starts a handler with the commander root as parent (in-loop form),
    /// returning the awaitable handle back.
    pub fn call_handler(
        &self,
        handler: &HandlerCoroutine,
    ) -> Result<HandlerCoroutine, RuntimeError> {
        self.core
            .submit_handler(handler.task_node().inner_arc(), self.core.root())?;
        Ok(handler.clone())
    }

    /// Hands a job to the loop from any thread.
    ///
    /// Returns once the submission is accepted (recorded on the bridge),
    /// not after the job has run.
    pub fn put_job_threadsafe(&self, job: &Job) -> Result<(), RuntimeError> {
        let bridge = self.core.bridge_handle()?;
        if !bridge.submit(Submission::Job(job.clone())) {
            return Err(RuntimeError::NotRunning);
        }
        Ok(())
    }

    /// Hands a handler to the loop from any thread; it starts under the
    /// commander root once the loop picks it up.
    pub fn call_handler_threadsafe(
        &self,
        handler: &HandlerCoroutine,
    ) -> Result<HandlerCoroutine, RuntimeError> {
        let bridge = self.core.bridge_handle()?;
        if !bridge.submit(Submission::Handler(handler.clone())) {
            return Err(RuntimeError::NotRunning);
        }
        Ok(handler.clone())
    }

    /// Requests shutdown; `run` will return `return_result`.
    ///
    /// With `wait`, blocks until the loop has returned — never pass `wait`
    /// from inside a body (use `TaskNode::exit_commander` there). Calling
    /// `exit` on a stopped commander records the value and returns.
    pub fn exit(&self, return_result: Value, wait: bool) {
        self.core.request_exit(return_result);
        if wait {
            self.wait_for_exit();
        }
    }

    /// Blocks passively until the loop has returned, yielding the exit
    /// value. Returns immediately when no loop is running.
    pub fn wait_for_exit(&self) -> Value {
        self.core.gate.wait();
        self.core.exit_value()
    }

    /// True iff the job queue, the child set, and the threadsafe bridge
    /// are all empty.
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// True while the loop is running.
    pub fn running_status(&self) -> bool {
        *lock(&self.core.running)
    }

    /// The commander's root task node.
    ///
    /// Register `at_commander_end` callbacks here; they fire first when
    /// the loop returns.
    pub fn node(&self) -> TaskNode {
        TaskNode::from_arc(Arc::clone(self.core.root()))
    }

    fn run_loop(&self, jobs: Vec<Job>, auto_exit: bool) -> Result<Value, RuntimeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|source| RuntimeError::Runtime { source })?;

        let (queue_rx, bridge_rx, shutdown) = self.core.begin_session()?;
        let core = Arc::clone(&self.core);
        let loop_result = runtime.block_on(async move {
            let result = event_loop(
                Arc::clone(&core),
                queue_rx,
                bridge_rx,
                jobs,
                auto_exit,
                shutdown,
            )
            .await;
            if result.is_ok() {
                core.fire_commander_end().await;
            }
            result
        });

        let exit_value = self.core.exit_value();
        self.core.end_session();
        loop_result.map(|()| exit_value)
    }
}

impl Default for Commander {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Commander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commander")
            .field("running", &self.running_status())
            .field("empty", &self.is_empty())
            .finish()
    }
}
