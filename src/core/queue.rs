//! # JobQueue: the commander's FIFO job channel.
//!
//! A thin wrapper over [`tokio::sync::mpsc`] that unifies the bounded and
//! unbounded flavors behind one interface and tracks its own depth, so
//! `Commander::is_empty` can observe "queue drained" without touching the
//! receiver.
//!
//! ## Rules
//! - Strict FIFO: items are delivered in push order.
//! - `push` suspends only on a bounded queue that is full.
//! - Closing the receiver makes every later `push` fail, which the
//!   commander surfaces as `NotRunning`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

enum Tx<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for Tx<T> {
    fn clone(&self) -> Self {
        match self {
            Tx::Bounded(tx) => Tx::Bounded(tx.clone()),
            Tx::Unbounded(tx) => Tx::Unbounded(tx.clone()),
        }
    }
}

enum Rx<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

/// Sender half of the job queue. Cheap to clone.
pub(crate) struct JobQueue<T> {
    tx: Tx<T>,
    depth: Arc<AtomicUsize>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            depth: Arc::clone(&self.depth),
        }
    }
}

/// Receiver half of the job queue; owned by the commander loop.
pub(crate) struct JobQueueRx<T> {
    rx: Rx<T>,
    depth: Arc<AtomicUsize>,
}

/// Creates a queue with the given capacity (0 = unbounded).
pub(crate) fn channel<T>(capacity: usize) -> (JobQueue<T>, JobQueueRx<T>) {
    let depth = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = match capacity {
        0 => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Tx::Unbounded(tx), Rx::Unbounded(rx))
        }
        n => {
            let (tx, rx) = mpsc::channel(n);
            (Tx::Bounded(tx), Rx::Bounded(rx))
        }
    };
    (
        JobQueue {
            tx,
            depth: Arc::clone(&depth),
        },
        JobQueueRx { rx, depth },
    )
}

impl<T> JobQueue<T> {
    /// Pushes an item, suspending while a bounded queue is full.
    ///
    /// Returns `false` when the receiver is gone (loop stopped).
    pub(crate) async fn push(&self, item: T) -> bool {
        self.depth.fetch_add(1, Ordering::SeqCst);
        let sent = match &self.tx {
            Tx::Bounded(tx) => tx.send(item).await.is_ok(),
            Tx::Unbounded(tx) => tx.send(item).is_ok(),
        };
        if !sent {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        sent
    }

    /// Number of pushed-but-undelivered items.
    pub(crate) fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

impl<T> JobQueueRx<T> {
    /// Receives the next item in FIFO order; `None` once the queue is
    /// closed and drained.
    pub(crate) async fn recv(&mut self) -> Option<T> {
        let item = match &mut self.rx {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        };
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    /// Receives without waiting; used to drain leftovers during shutdown.
    pub(crate) fn try_recv(&mut self) -> Option<T> {
        let item = match &mut self.rx {
            Rx::Bounded(rx) => rx.try_recv().ok(),
            Rx::Unbounded(rx) => rx.try_recv().ok(),
        };
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    /// Stops further pushes; buffered items remain receivable.
    pub(crate) fn close(&mut self) {
        match &mut self.rx {
            Rx::Bounded(rx) => rx.close(),
            Rx::Unbounded(rx) => rx.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_and_depth() {
        let (queue, mut rx) = channel::<u32>(0);
        assert!(queue.push(1).await);
        assert!(queue.push(2).await);
        assert!(queue.push(3).await);
        assert_eq!(queue.depth(), 3);

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn closed_queue_rejects_push() {
        let (queue, mut rx) = channel::<u32>(4);
        rx.close();
        assert!(!queue.push(7).await);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn drain_after_close() {
        let (queue, mut rx) = channel::<u32>(0);
        assert!(queue.push(1).await);
        assert!(queue.push(2).await);
        rx.close();
        assert_eq!(rx.try_recv(), Some(1));
        assert_eq!(rx.try_recv(), Some(2));
        assert_eq!(rx.try_recv(), None);
    }
}
