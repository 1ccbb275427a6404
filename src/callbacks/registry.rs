//! # Lifecycle events and the per-node callback registry.
//!
//! Seven lifecycle events exist, fired in a fixed order relative to state
//! transitions:
//!
//! | Event                              | When                                              |
//! |------------------------------------|---------------------------------------------------|
//! | `AtJobStart` / `AtHandlerStart`    | Just after state → Running, before the body runs. |
//! | `AtException`                      | Body failed; state just set to Failed.            |
//! | `AtTerminate`                      | External termination; state just set to Terminated.|
//! | `AtJobEnd` / `AtHandlerEnd`        | Node drained (body returned, children terminal).  |
//! | `AtCommanderEnd`                   | Commander loop about to return.                   |
//!
//! ## Dispatch rules
//! - Callbacks for an event run in insertion order.
//! - Async callbacks are awaited on the loop; a slow callback delays the
//!   owning node, never its siblings' registries.
//! - A panicking callback is caught, logged, and suppressed; remaining
//!   callbacks still run and the node's state is unaffected.

use std::str::FromStr;

use futures::FutureExt;

use crate::callbacks::CallbackDescriptor;
use crate::error::RuntimeError;
use crate::nodes::TaskNode;

/// Classification of lifecycle callback events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackEvent {
    /// A job's state just became Running.
    AtJobStart,
    /// A handler's state just became Running.
    AtHandlerStart,
    /// A body failed; the node just became Failed.
    AtException,
    /// The node was terminated.
    AtTerminate,
    /// A handler drained (body returned, children terminal).
    AtHandlerEnd,
    /// A job drained (body returned, children terminal).
    AtJobEnd,
    /// The commander loop is about to return.
    AtCommanderEnd,
}

/// All events, in slot order.
pub(crate) const EVENT_COUNT: usize = 7;

impl CallbackEvent {
    /// Returns the canonical snake_case name of this event.
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackEvent::AtJobStart => "at_job_start",
            CallbackEvent::AtHandlerStart => "at_handler_start",
            CallbackEvent::AtException => "at_exception",
            CallbackEvent::AtTerminate => "at_terminate",
            CallbackEvent::AtHandlerEnd => "at_handler_end",
            CallbackEvent::AtJobEnd => "at_job_end",
            CallbackEvent::AtCommanderEnd => "at_commander_end",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            CallbackEvent::AtJobStart => 0,
            CallbackEvent::AtHandlerStart => 1,
            CallbackEvent::AtException => 2,
            CallbackEvent::AtTerminate => 3,
            CallbackEvent::AtHandlerEnd => 4,
            CallbackEvent::AtJobEnd => 5,
            CallbackEvent::AtCommanderEnd => 6,
        }
    }
}

impl std::fmt::Display for CallbackEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackEvent {
    type Err = RuntimeError;

    /// Parses a canonical event name, for string-driven wiring.
    ///
    /// Unknown names yield [`RuntimeError::InvalidCallbackEvent`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "at_job_start" => Ok(CallbackEvent::AtJobStart),
            "at_handler_start" => Ok(CallbackEvent::AtHandlerStart),
            "at_exception" => Ok(CallbackEvent::AtException),
            "at_terminate" => Ok(CallbackEvent::AtTerminate),
            "at_handler_end" => Ok(CallbackEvent::AtHandlerEnd),
            "at_job_end" => Ok(CallbackEvent::AtJobEnd),
            "at_commander_end" => Ok(CallbackEvent::AtCommanderEnd),
            other => Err(RuntimeError::InvalidCallbackEvent {
                name: other.to_string(),
            }),
        }
    }
}

/// Ordered callback lists, one slot per [`CallbackEvent`].
#[derive(Default, Debug)]
pub struct CallbackRegistry {
    slots: [Vec<CallbackDescriptor>; EVENT_COUNT],
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one descriptor to an event's list.
    pub fn add(&mut self, event: CallbackEvent, descriptor: CallbackDescriptor) {
        self.slots[event.slot()].push(descriptor);
    }

    /// Appends descriptors to an event's list, preserving their order.
    pub fn extend(
        &mut self,
        event: CallbackEvent,
        descriptors: impl IntoIterator<Item = CallbackDescriptor>,
    ) {
        self.slots[event.slot()].extend(descriptors);
    }

    /// Returns the descriptors registered for an event, in insertion order.
    pub fn get(&self, event: CallbackEvent) -> &[CallbackDescriptor] {
        &self.slots[event.slot()]
    }

    /// True when at least one descriptor is registered for `event`.
    pub fn has(&self, event: CallbackEvent) -> bool {
        !self.slots[event.slot()].is_empty()
    }

    /// Merges another registry into this one, slot by slot.
    pub fn merge(&mut self, other: CallbackRegistry) {
        for (slot, descriptors) in other.slots.into_iter().enumerate() {
            self.slots[slot].extend(descriptors);
        }
    }
}

/// Runs every callback registered on `node` for `event`, in order.
///
/// Panics inside a callback are caught and logged; they neither change the
/// node's state nor stop the remaining callbacks.
pub(crate) async fn dispatch(node: &TaskNode, event: CallbackEvent) {
    let descriptors = node.callbacks_for(event);
    if descriptors.is_empty() {
        return;
    }

    for descriptor in descriptors {
        let fut = descriptor.invoke(node);
        if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            tracing::error!(
                task = %node.name(),
                event = %event,
                "callback panicked: {:?}",
                panic_message(&panic),
            );
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_round_trip() {
        for event in [
            CallbackEvent::AtJobStart,
            CallbackEvent::AtHandlerStart,
            CallbackEvent::AtException,
            CallbackEvent::AtTerminate,
            CallbackEvent::AtHandlerEnd,
            CallbackEvent::AtJobEnd,
            CallbackEvent::AtCommanderEnd,
        ] {
            assert_eq!(event.as_str().parse::<CallbackEvent>().ok(), Some(event));
        }
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let err = "at_reboot".parse::<CallbackEvent>().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::InvalidCallbackEvent { name } if name == "at_reboot"
        ));
    }

    #[test]
    fn registry_preserves_insertion_order() {
        let mut registry = CallbackRegistry::new();
        registry.add(CallbackEvent::AtJobEnd, CallbackDescriptor::sync(|| {}));
        registry.extend(
            CallbackEvent::AtJobEnd,
            vec![
                CallbackDescriptor::sync(|| {}),
                CallbackDescriptor::sync_with_node(|_| {}),
            ],
        );

        let descriptors = registry.get(CallbackEvent::AtJobEnd);
        assert_eq!(descriptors.len(), 3);
        assert!(!descriptors[0].injects_task_node());
        assert!(descriptors[2].injects_task_node());
        assert!(!registry.has(CallbackEvent::AtJobStart));
    }
}
