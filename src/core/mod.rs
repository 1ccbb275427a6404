//! Runtime core: the commander, its loop, and the machinery it wires up.
//!
//! The only public API re-exported from here is [`Commander`]. Everything
//! else is an internal building block:
//!
//! - **commander.rs**: public facade + event loop; owns the session
//!   (queue, bridge, shutdown token, task tracker), seeds initial jobs,
//!   drives the drain/grace sequence, fires `at_commander_end`.
//! - **queue.rs**: FIFO job channel (bounded or unbounded) with a depth
//!   count for `is_empty`.
//! - **bridge.rs**: cross-thread submissions with an accepted-but-pending
//!   count so emptiness cannot flicker.
//! - **runner.rs**: one body activation (start callbacks, cancellation
//!   race, result/exception recording) and upward completion propagation.

mod bridge;
mod commander;
mod queue;
mod runner;

pub use commander::Commander;

pub(crate) use commander::CommanderCore;
pub(crate) use runner::drive;
