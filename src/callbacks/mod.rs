//! Lifecycle callbacks: descriptors, events, and the per-node registry.
//!
//! - [`CallbackDescriptor`] one registered callback (sync or async, with
//!   optional task-node injection).
//! - [`CallbackEvent`] the seven lifecycle events.
//! - [`CallbackRegistry`] ordered descriptor lists, one per event.

mod descriptor;
mod registry;

pub use descriptor::{CallbackDescriptor, CallbackFuture};
pub use registry::{CallbackEvent, CallbackRegistry};

pub(crate) use registry::dispatch;
