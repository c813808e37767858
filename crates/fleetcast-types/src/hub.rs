//! Typed publish-subscribe event hub.
//!
//! A single event enum fanned out over a [`tokio::sync::broadcast`] channel
//! gives every subscriber every event, so there is no need for a separate
//! `all`-events registry alongside per-kind subscriptions — just subscribe
//! and match on what you want. This hub is a thin, testable wrapper around
//! that channel.

use tokio::sync::broadcast;

/// A typed fan-out hub for event enum `E`.
///
/// Cloning an `EventHub` shares the same underlying channel: every clone's
/// [`EventHub::emit`] is observed by every [`EventHub::subscribe`]r,
/// regardless of which clone produced or consumed it.
#[derive(Debug)]
pub struct EventHub<E: Clone + Send + 'static> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> Clone for EventHub<E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<E: Clone + Send + 'static> EventHub<E> {
    /// Create a hub with the given broadcast channel capacity (the number
    /// of not-yet-received events a slow subscriber may lag behind before
    /// it starts missing events).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to every current subscriber. A no-op (returns the
    /// would-be receiver count of zero) if nobody is currently subscribed.
    pub fn emit(&self, event: E) {
        // Every subscriber gone is not an error: events are fire-and-forget.
        let _ = self.tx.send(event);
    }

    /// Subscribe to every event emitted on this hub from this point forward.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Number of currently live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Clone + Send + 'static> Default for EventHub<E> {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Msg {
        Ping,
        Pong(u32),
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let hub: EventHub<Msg> = EventHub::new(16);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.emit(Msg::Ping);
        hub.emit(Msg::Pong(7));

        assert_eq!(a.recv().await.unwrap(), Msg::Ping);
        assert_eq!(a.recv().await.unwrap(), Msg::Pong(7));
        assert_eq!(b.recv().await.unwrap(), Msg::Ping);
        assert_eq!(b.recv().await.unwrap(), Msg::Pong(7));
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let hub: EventHub<Msg> = EventHub::new(16);
        hub.emit(Msg::Ping);
        let mut late = hub.subscribe();
        hub.emit(Msg::Pong(1));
        assert_eq!(late.recv().await.unwrap(), Msg::Pong(1));
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let hub: EventHub<Msg> = EventHub::new(4);
        hub.emit(Msg::Ping);
    }
}
