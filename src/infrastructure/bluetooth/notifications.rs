//! Notification Channel
//!
//! Synchronous fan-out of values to subscribers, in subscription order.
//! `publish` iterates a snapshot, so subscribers may unsubscribe (themselves
//! or others) mid-delivery without disturbing the current round.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct NotificationChannel<T> {
    observers: Mutex<Vec<(SubscriptionId, Observer<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for NotificationChannel<T> {
    fn default() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> NotificationChannel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers().push((id, Arc::new(observer)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers();
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers().len()
    }

    /// Deliver `value` to every current subscriber, in subscription order.
    pub fn publish(&self, value: &T) {
        let snapshot: Vec<Observer<T>> = self
            .observers()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in snapshot {
            observer(value);
        }
    }

    fn observers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Observer<T>)>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> NotificationChannel<T> {
    /// Bridge future notifications into an async channel.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |value: &T| {
            // Receiver dropped: nothing left to deliver to
            let _ = tx.send(value.clone());
        });
        (id, rx)
    }
}
