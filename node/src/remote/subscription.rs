use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use waypost_engine::RemoteSnapshot;

type CancelFn = Box<dyn FnOnce() + Send>;

/// A cancellable stream of remote snapshots.
///
/// Dropping the subscription cancels it. Once cancelled the stream yields
/// whatever was already buffered and then ends.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<RemoteSnapshot>,
    cancel: Option<CancelFn>,
}

impl Subscription {
    /// Wrap a snapshot channel. `cancel` runs exactly once, on
    /// [`Subscription::unsubscribe`] or drop.
    pub fn new(
        events: mpsc::UnboundedReceiver<RemoteSnapshot>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Wait for the next snapshot. `None` once the subscription has ended.
    pub async fn next_snapshot(&mut self) -> Option<RemoteSnapshot> {
        self.events.recv().await
    }

    /// Stop receiving snapshots.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
        self.events.close();
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Stream for Subscription {
    type Item = RemoteSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn yields_snapshots_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = Subscription::new(rx, || {});

        tx.send(RemoteSnapshot::default()).unwrap();
        tx.send(RemoteSnapshot::initial(vec![])).unwrap();
        drop(tx);

        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn cancel_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = calls.clone();
        let mut sub = Subscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sub.unsubscribe();
        assert!(!sub.is_active());
        assert!(tx.send(RemoteSnapshot::default()).is_err());
        assert!(sub.next_snapshot().await.is_none());

        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = calls.clone();
        let sub = Subscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
