//! # Node lifecycle states and identifiers.

use std::fmt;

/// Lifecycle state of a task node.
///
/// States advance `Pending → Running → {Done, Failed, Terminated}`.
/// The three terminal states are monotonic: once a node is sealed it never
/// changes state again (a reusable handler is *reset*, not mutated — the
/// reset puts it back to `Pending` with a cleared result and exception
/// before any new activation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting to start execution.
    Pending,
    /// Body is running, or the node is draining its children.
    Running,
    /// Body returned and every child reached a terminal state.
    Done,
    /// Body failed; the error is stored in the node's exception slot.
    Failed,
    /// The node was terminated before completing.
    Terminated,
}

impl NodeState {
    /// True for `Done`, `Failed`, and `Terminated`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Done | NodeState::Failed | NodeState::Terminated
        )
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            NodeState::Pending => "pending",
            NodeState::Running => "running",
            NodeState::Done => "done",
            NodeState::Failed => "failed",
            NodeState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Identity of a task node.
///
/// Nodes scheduled by a commander receive a sequence number from its
/// monotonic counter. A node may instead be named explicitly before
/// scheduling; named nodes keep their name and are never renumbered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// Automatically assigned sequence number.
    Seq(u64),
    /// User-assigned name.
    Name(String),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Seq(n) => write!(f, "#{n}"),
            NodeId::Name(s) => f.write_str(s),
        }
    }
}

/// What kind of unit a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// The commander root.
    Commander,
    /// A queue-scheduled job.
    Job,
    /// A directly invoked handler.
    Handler,
}
