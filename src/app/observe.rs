//! Publish-on-write value cells
//!
//! [`Observable`] holds a value and a list of subscribers that are called
//! synchronously after every write. Subscribers stay registered until they
//! are explicitly removed with [`Observable::unsubscribe`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle returned by [`Observable::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A value cell that notifies subscribers on every write
pub struct Observable<T> {
    value: Mutex<T>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber<T>)>>,
    next_id: AtomicU64,
}

impl<T: Clone> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        lock(&self.value).clone()
    }

    /// Replace the value and notify every subscriber with the new value
    ///
    /// Subscribers run on the caller's thread after the value lock has been
    /// released, so they may read the cell again.
    pub fn set(&self, value: T) {
        *lock(&self.value) = value.clone();
        self.publish(&value);
    }

    /// Apply `f` to the value in place, then notify subscribers
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let snapshot = {
            let mut guard = lock(&self.value);
            f(&mut guard);
            guard.clone()
        };
        self.publish(&snapshot);
    }

    /// Register a subscriber; it is not called with the current value
    pub fn subscribe<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push((id, Arc::new(f)));
        id
    }

    /// Remove a subscriber, returning whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    fn publish(&self, value: &T) {
        let subscribers: Vec<Subscriber<T>> = lock(&self.subscribers)
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for subscriber in subscribers {
            subscriber(value);
        }
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.get())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Lock a std mutex, recovering the data if a subscriber panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
