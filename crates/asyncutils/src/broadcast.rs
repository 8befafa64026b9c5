//! Payload-free publish/subscribe.

use std::sync::Arc;
use tokio::sync::watch;

/// Publishing end of a refresh signal.
///
/// Cloning is cheap and every clone publishes to the same set of
/// subscribers. The signal carries no payload: subscribers only learn that
/// *something* changed since they last looked.
///
/// Publishes that land before a subscriber gets round to waiting again are
/// collapsed into a single wake-up, so a burst of publishes costs each
/// subscriber one refetch rather than one per publish.
///
/// # Examples
///
/// ```
/// use tabula_asyncutils::Broadcaster;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let broadcaster = Broadcaster::new();
/// let mut subscription = broadcaster.subscribe();
///
/// broadcaster.publish();
/// broadcaster.publish();
/// assert_eq!(subscription.recv().await, Some(()));
/// assert!(!subscription.has_pending());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: Arc<watch::Sender<u64>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Wake every current subscriber.
    ///
    /// Publishing with nobody subscribed is not an error; the signal is
    /// simply lost.
    pub fn publish(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
        tracing::trace!(subscribers = self.tx.receiver_count(), "Published refresh signal");
    }

    /// Register a new subscriber. Only publishes made after this call are observed.
    pub fn subscribe(&self) -> Subscription {
        Subscription { rx: self.tx.subscribe() }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total number of publishes so far.
    pub fn published(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a refresh signal. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<u64>,
}

impl Subscription {
    /// Wait for the next publish.
    ///
    /// Returns `None` once every [`Broadcaster`] handle is gone and nothing
    /// can be published any more.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.changed().await.ok()
    }

    /// Whether a publish has happened that [`recv`](Self::recv) hasn't consumed yet.
    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn test_every_subscriber_is_woken() {
        let broadcaster = Broadcaster::new();
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        broadcaster.clone().publish();
        assert_eq!(first.recv().await, Some(()));
        assert_eq!(second.recv().await, Some(()));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_publish() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish();
        let mut late = broadcaster.subscribe();
        assert!(!late.has_pending());
        assert!(late.recv().now_or_never().is_none());
        assert_eq!(broadcaster.published(), 1);
    }

    #[tokio::test]
    async fn test_burst_collapses_to_one_wake() {
        let broadcaster = Broadcaster::new();
        let mut subscription = broadcaster.subscribe();
        for _ in 0..5 {
            broadcaster.publish();
        }
        assert_eq!(subscription.recv().await, Some(()));
        assert!(subscription.recv().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_and_close() {
        let broadcaster = Broadcaster::new();
        let subscription = broadcaster.subscribe();
        drop(subscription);
        assert_eq!(broadcaster.subscriber_count(), 0);
        broadcaster.publish();

        let mut orphan = broadcaster.subscribe();
        drop(broadcaster);
        assert_eq!(orphan.recv().await, None);
    }
}
