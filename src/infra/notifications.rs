use crate::domain::Entry;
use std::sync::{Arc, Mutex, MutexGuard};

pub type Subscriber = Box<dyn Fn(&[Entry]) + Send + Sync + 'static>;

type SharedSubscriber = Arc<dyn Fn(&[Entry]) + Send + Sync + 'static>;

/// Holds at most one subscriber; every publish hands it the full snapshot.
/// Nothing is queued, so a subscriber registered late only sees later
/// snapshots. The subscriber runs outside the slot lock, so it may call back
/// into the channel.
#[derive(Clone, Default)]
pub struct NotificationChannel {
    subscriber: Arc<Mutex<Option<SharedSubscriber>>>,
}

impl std::fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

impl NotificationChannel {
    /// Replaces any previous subscriber.
    pub fn subscribe(&self, subscriber: Subscriber) {
        *self.slot() = Some(Arc::from(subscriber));
    }

    pub fn unsubscribe(&self) {
        *self.slot() = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot().is_some()
    }

    /// Returns false when nobody is listening.
    pub fn publish(&self, entries: &[Entry]) -> bool {
        let current = self.slot().clone();
        match current {
            Some(subscriber) => {
                subscriber(entries);
                true
            }
            None => false,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<SharedSubscriber>> {
        // A subscriber that panicked leaves the slot itself intact.
        self.subscriber
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
