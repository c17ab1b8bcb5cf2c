//! Notifications for code running off the real-time path.
//!
//! Subscribers receive [`SyncEvent`]s over bounded channels. Delivery never
//! blocks the sender: a subscriber that falls behind loses events, and a
//! subscriber whose receiver is dropped is removed on the next publish.

use crate::clock::SyncMode;
use crate::transport::TransportState;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use log::{trace, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

const SUBSCRIBER_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    PulseReceived { timestamp: f64 },
    TempoChanged { bpm: f64 },
    SyncAcquired,
    SyncLost,
    Recovering,
    FellBackToInternal,
    ModeChanged(SyncMode),
    TransportChanged(TransportState),
    PositionChanged { beats: f64 },
}

pub type SubscriptionId = u64;

/// A live subscription. Dropping it (or its receiver) ends delivery.
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: Receiver<SyncEvent>,
}

#[derive(Default)]
pub struct Notifier {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Sender<SyncEvent>)>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = bounded(SUBSCRIBER_CAPACITY);
        self.subscribers.lock().push((id, tx));
        Subscription { id, events: rx }
    }

    /// Returns false if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn publish(&self, events: &[SyncEvent]) {
        if events.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(id, tx)| {
            for event in events {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("Subscriber {} is full, dropping {:?}", id, event);
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        trace!("Subscriber {} went away", id);
                        return false;
                    }
                }
            }
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_receive_events() {
        let notifier = Notifier::new();
        let first = notifier.subscribe();
        let second = notifier.subscribe();
        assert_ne!(first.id, second.id);

        notifier.publish(&[SyncEvent::SyncAcquired, SyncEvent::TempoChanged { bpm: 121.0 }]);

        for sub in [&first, &second] {
            let received: Vec<_> = sub.events.try_iter().collect();
            assert_eq!(
                received,
                vec![SyncEvent::SyncAcquired, SyncEvent::TempoChanged { bpm: 121.0 }]
            );
        }
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let notifier = Notifier::new();
        let sub = notifier.subscribe();
        assert!(notifier.unsubscribe(sub.id));
        assert!(!notifier.unsubscribe(sub.id));

        notifier.publish(&[SyncEvent::SyncLost]);
        assert!(sub.events.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let notifier = Notifier::new();
        let sub = notifier.subscribe();
        let _kept = notifier.subscribe();
        drop(sub);

        notifier.publish(&[SyncEvent::Recovering]);
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[test]
    fn test_full_subscriber_does_not_block() {
        let notifier = Notifier::new();
        let sub = notifier.subscribe();
        let burst: Vec<_> = (0..SUBSCRIBER_CAPACITY + 10)
            .map(|i| SyncEvent::PulseReceived {
                timestamp: i as f64,
            })
            .collect();
        notifier.publish(&burst);
        assert_eq!(sub.events.len(), SUBSCRIBER_CAPACITY);
        assert_eq!(notifier.subscriber_count(), 1);
    }
}
