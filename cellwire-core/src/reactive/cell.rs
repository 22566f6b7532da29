//! Observable Cell Implementation
//!
//! An `ObservableCell` holds a value and remembers which consumers have read
//! it. Writing a value that differs from the stored one notifies every such
//! consumer, which in turn asks its UI framework for a re-render.
//!
//! # How Cells Work
//!
//! 1. A consumer reads the cell through
//!    [`ReactiveConsumer::tracked_read`], which subscribes it.
//!
//! 2. Someone writes a new value. The cell stores it, compares it with the
//!    previous value, and if they differ, notifies every live subscriber.
//!
//! 3. When the consumer unmounts it unsubscribes itself from every cell it
//!    read.
//!
//! # Change Detection
//!
//! [`ObservableCell::new`] compares values with `PartialEq`.
//! [`ObservableCell::with_equality`] takes an explicit comparison instead,
//! e.g. [`ptr_eq`] for identity comparison of shared values. Only the chosen
//! comparison is applied: for compound values held behind `Arc`, mutating
//! the inner data in place is invisible to `ptr_eq`, so writers wanting a
//! notification must store a new top-level value.
//!
//! # Thread Safety
//!
//! The value and the subscriber set are guarded by one mutex. Subscribers are
//! notified after that mutex is released, so a re-render may read or write
//! this cell (or any other) synchronously.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::consumer::ReactiveConsumer;
use super::error::ReactiveError;
use super::subscriber::{Subscriber, SubscriberId};

/// Unique identifier for a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Identity comparison for shared values.
///
/// Use with [`ObservableCell::with_equality`] when the cell holds an `Arc`
/// and only replacing the `Arc` itself should count as a change.
pub fn ptr_eq<U: ?Sized>(a: &Arc<U>, b: &Arc<U>) -> bool {
    Arc::ptr_eq(a, b)
}

type Live = SmallVec<[Arc<dyn Subscriber>; 4]>;

struct CellState<T> {
    value: T,
    /// Bumped on every store; lets `update` detect a concurrent write.
    version: u64,
    subscribers: IndexMap<SubscriberId, Weak<dyn Subscriber>>,
}

impl<T> CellState<T> {
    /// Store `value`, returning the subscribers to notify if it changed.
    fn store(&mut self, value: T, equality: fn(&T, &T) -> bool, cell: CellId) -> Option<Live> {
        let changed = !equality(&self.value, &value);
        self.value = value;
        self.version += 1;
        if !changed {
            trace!(%cell, "write without change");
            return None;
        }
        Some(self.live_subscribers(cell))
    }

    /// Upgrade every subscriber, dropping the ones that are gone.
    fn live_subscribers(&mut self, cell: CellId) -> Live {
        let before = self.subscribers.len();
        let mut live = Live::new();
        self.subscribers.retain(|_, weak| match weak.upgrade() {
            Some(subscriber) => {
                live.push(subscriber);
                true
            }
            None => false,
        });

        let pruned = before - self.subscribers.len();
        if pruned > 0 {
            trace!(%cell, pruned, "compacted dropped subscribers");
        }
        live
    }
}

struct CellInner<T> {
    id: CellId,
    equality: fn(&T, &T) -> bool,
    state: Mutex<CellState<T>>,
}

/// Type-erased view of a cell.
///
/// Consumers hold their tracked cells through this trait so that one
/// consumer can track cells of different value types.
pub(crate) trait TrackedCell: Send + Sync {
    /// Remove a subscriber. Returns whether it was present.
    fn remove_subscriber(&self, id: SubscriberId) -> bool;
}

impl<T> TrackedCell for CellInner<T>
where
    T: Send + 'static,
{
    fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let removed = self.state.lock().subscribers.shift_remove(&id).is_some();
        if removed {
            trace!(cell = %self.id, consumer = %id, "unsubscribed");
        }
        removed
    }
}

/// A value container that notifies the consumers that read it.
///
/// Cloning a cell produces another handle to the same value and subscriber
/// set; pass handles to whichever components need them.
///
/// # Example
///
/// ```rust
/// use cellwire_core::reactive::ObservableCell;
///
/// let clock = ObservableCell::new(0u64);
/// assert_eq!(clock.get(), 0);
///
/// // Writing the same value is not a change.
/// assert!(!clock.write(0));
/// assert!(clock.write(1));
/// ```
pub struct ObservableCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<CellInner<T>>,
}

impl<T> ObservableCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a cell that detects changes with `PartialEq`.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, <T as PartialEq>::eq)
    }
}

impl<T> ObservableCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cell with an explicit change-detection function.
    ///
    /// `equality(old, new)` returning `true` means "unchanged": the value is
    /// still stored, but nobody is notified.
    pub fn with_equality(value: T, equality: fn(&T, &T) -> bool) -> Self {
        Self {
            inner: Arc::new(CellInner {
                id: CellId::next(),
                equality,
                state: Mutex::new(CellState {
                    value,
                    version: 0,
                    subscribers: IndexMap::new(),
                }),
            }),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Get the current value, subscribing `consumer` first if one is given.
    ///
    /// `read(None)` has no side effects. A consumer passed here is tracked
    /// exactly as by [`ReactiveConsumer::tracked_read`], so its unmount hook
    /// releases the subscription; a consumer that is not mounted is not
    /// subscribed.
    pub fn read(&self, consumer: Option<&ReactiveConsumer>) -> T {
        if let Some(consumer) = consumer {
            self.subscribe(consumer);
        }
        self.inner.state.lock().value.clone()
    }

    /// Get the current value without subscribing anyone.
    pub fn get(&self) -> T {
        self.read(None)
    }

    /// Borrow the current value without cloning it.
    ///
    /// The cell is locked while `f` runs; `f` must not touch this cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.state.lock().value)
    }

    /// Store a new value, notifying subscribers if it differs from the old
    /// one.
    ///
    /// Returns whether a change was detected. Subscribers are notified after
    /// the new value is in place, in no particular order.
    pub fn write(&self, value: T) -> bool {
        let targets = {
            let mut state = self.inner.state.lock();
            state.store(value, self.inner.equality, self.inner.id)
        };
        match targets {
            Some(targets) => {
                self.deliver(targets);
                true
            }
            None => false,
        }
    }

    /// Compute the next value from the current one and write it.
    ///
    /// `f` runs without the cell locked, so it may read this cell or any
    /// other. If another write lands while `f` runs, `f` is called again on
    /// the newer value, so concurrent updates are not lost. `f` must not
    /// write this cell itself, or it will be retried forever.
    pub fn update(&self, mut f: impl FnMut(&T) -> T) -> bool {
        loop {
            let (current, version) = {
                let state = self.inner.state.lock();
                (state.value.clone(), state.version)
            };
            let next = f(&current);

            let targets = {
                let mut state = self.inner.state.lock();
                if state.version != version {
                    trace!(cell = %self.inner.id, "concurrent write, retrying update");
                    continue;
                }
                state.store(next, self.inner.equality, self.inner.id)
            };
            return match targets {
                Some(targets) => {
                    self.deliver(targets);
                    true
                }
                None => false,
            };
        }
    }

    /// Subscribe `consumer` and record this cell in its tracked set.
    ///
    /// Subscribing twice is a no-op. A consumer that is not mounted is
    /// refused and nothing changes.
    pub fn subscribe(&self, consumer: &ReactiveConsumer) {
        if let Err(err) = consumer.track(self) {
            warn!(cell = %self.inner.id, error = %err, "refusing to subscribe consumer");
        }
    }

    /// Unsubscribe `consumer` and drop this cell from its tracked set.
    ///
    /// Removing a non-member is a no-op.
    pub fn unsubscribe(&self, consumer: &ReactiveConsumer) {
        consumer.untrack(self.inner.id);
        self.inner.remove_subscriber(consumer.id());
    }

    /// Whether `consumer` is currently subscribed.
    pub fn is_subscribed(&self, consumer: &ReactiveConsumer) -> bool {
        self.inner
            .state
            .lock()
            .subscribers
            .contains_key(&consumer.id())
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .subscribers
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub(crate) fn as_tracked(&self) -> Weak<dyn TrackedCell> {
        let tracked: Arc<dyn TrackedCell> = self.inner.clone();
        Arc::downgrade(&tracked)
    }

    /// Add to the subscriber set only. Callers keep the consumer side.
    pub(crate) fn attach(&self, id: SubscriberId, subscriber: Weak<dyn Subscriber>) {
        let mut state = self.inner.state.lock();
        if state.subscribers.contains_key(&id) {
            return;
        }
        state.subscribers.insert(id, subscriber);
        trace!(cell = %self.inner.id, consumer = %id, "subscribed");
    }

    /// Notify subscribers. Must be called without the state lock held.
    fn deliver(&self, targets: Live) {
        debug!(cell = %self.inner.id, subscribers = targets.len(), "value changed");
        let mut rejected: SmallVec<[SubscriberId; 2]> = SmallVec::new();

        for subscriber in targets {
            let id = subscriber.subscriber_id();
            trace!(cell = %self.inner.id, consumer = %id, "notifying");
            match subscriber.notify() {
                Ok(()) => {}
                // Lost a race with the consumer's unmount hook.
                Err(err @ ReactiveError::TornDown(_)) => {
                    debug!(cell = %self.inner.id, error = %err, "dropping torn-down subscriber");
                    rejected.push(id);
                }
                Err(err) => {
                    warn!(cell = %self.inner.id, error = %err, "dropping subscriber that rejected notification");
                    rejected.push(id);
                }
            }
        }

        if !rejected.is_empty() {
            let mut state = self.inner.state.lock();
            for id in rejected {
                state.subscribers.shift_remove(&id);
            }
        }
    }
}

impl<T> Clone for ObservableCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ObservableCell<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableCell")
            .field("id", &self.inner.id)
            .field("value", &self.get())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
