//! # Threadsafe bridge: cross-thread submission into the loop.
//!
//! Foreign threads hand work to the commander through the bridge. A
//! submission is recorded in the pending count *before* it is sent, and
//! settled only after the loop has materialized it (attached a parent and
//! enqueued the job or spawned the handler). `Commander::is_empty`
//! consults that count, so it can never report empty while an accepted
//! submission is still in flight.
//!
//! Submissions are delivered to the loop in arrival order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::nodes::{HandlerCoroutine, Job};

/// One cross-thread submission.
pub(crate) enum Submission {
    /// Enqueue a job under the commander root.
    Job(Job),
    /// Start a handler under the commander root.
    Handler(HandlerCoroutine),
}

/// Sender half of the bridge. Cheap to clone.
pub(crate) struct Bridge {
    tx: mpsc::UnboundedSender<Submission>,
    pending: Arc<AtomicUsize>,
}

impl Clone for Bridge {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

/// Receiver half of the bridge; owned by the commander loop.
pub(crate) struct BridgeRx {
    rx: mpsc::UnboundedReceiver<Submission>,
}

pub(crate) fn channel() -> (Bridge, BridgeRx) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Bridge {
            tx,
            pending: Arc::new(AtomicUsize::new(0)),
        },
        BridgeRx { rx },
    )
}

impl Bridge {
    /// Records and sends a submission.
    ///
    /// Returns `false` when the loop is gone; the pending count is rolled
    /// back in that case.
    pub(crate) fn submit(&self, submission: Submission) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(submission).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Number of accepted-but-unmaterialized submissions.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Marks one received submission as materialized (or discarded).
    pub(crate) fn settle(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BridgeRx {
    /// Receives the next submission in arrival order.
    ///
    /// The pending count is **not** decremented here; the loop settles the
    /// entry via [`Bridge::settle`] once the submission has been
    /// materialized.
    pub(crate) async fn recv(&mut self) -> Option<Submission> {
        self.rx.recv().await
    }

    /// Receives without waiting; used to drain leftovers during shutdown.
    pub(crate) fn try_recv(&mut self) -> Option<Submission> {
        self.rx.try_recv().ok()
    }

    /// Stops further submissions; buffered ones remain receivable.
    pub(crate) fn close(&mut self) {
        self.rx.close();
    }
}
