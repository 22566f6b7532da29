//! Reactive Consumer
//!
//! A `ReactiveConsumer` is embedded in a UI component. The component's render
//! logic reads cells through [`ReactiveConsumer::tracked_read`], which both
//! returns the value and subscribes the consumer, so the component is asked
//! to re-render whenever any cell it read changes.
//!
//! # Lifecycle
//!
//! ```text
//! Unmounted --on_mount--> Mounted --on_unmount--> TornDown
//! ```
//!
//! The framework calls each hook exactly once, in order. Reads and
//! notifications are only valid while mounted; anything else is rejected
//! with a [`ReactiveError`].
//!
//! # Stale Dependencies
//!
//! The tracked set only grows between mount and unmount. A cell that an
//! earlier render read but a later render does not stays subscribed, so the
//! component may receive a re-render request it did not strictly need. That
//! costs a wasted render, never a wrong one: the next render reflects the
//! current values.

use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::cell::{CellId, ObservableCell, TrackedCell};
use super::error::{ReactiveError, Result};
use super::subscriber::{Subscriber, SubscriberId, UpdateTrigger};

/// Observable lifecycle phase of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, mount hook not yet run.
    Unmounted,

    /// Between the mount and unmount hooks; reads are allowed.
    Mounted,

    /// Unmount hook has run. Terminal.
    TornDown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Unmounted => "unmounted",
            Phase::Mounted => "mounted",
            Phase::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

type Tracked = IndexMap<CellId, Weak<dyn TrackedCell>>;

/// The tracked set only exists while mounted.
enum Lifecycle {
    Unmounted,
    Mounted(Tracked),
    TornDown,
}

impl Lifecycle {
    fn phase(&self) -> Phase {
        match self {
            Lifecycle::Unmounted => Phase::Unmounted,
            Lifecycle::Mounted(_) => Phase::Mounted,
            Lifecycle::TornDown => Phase::TornDown,
        }
    }
}

struct ConsumerInner {
    id: SubscriberId,
    trigger: Box<dyn UpdateTrigger>,
    lifecycle: Mutex<Lifecycle>,
}

impl ConsumerInner {
    /// Move to `TornDown`, handing back the tracked set if we were mounted.
    fn tear_down(&self) -> std::result::Result<Tracked, Phase> {
        let mut lifecycle = self.lifecycle.lock();
        match mem::replace(&mut *lifecycle, Lifecycle::TornDown) {
            Lifecycle::Mounted(tracked) => Ok(tracked),
            other => {
                let phase = other.phase();
                *lifecycle = other;
                Err(phase)
            }
        }
    }

    /// Unsubscribe from every tracked cell. Returns how many were released.
    fn release(&self, tracked: Tracked) -> usize {
        let mut released = 0;
        for (cell_id, cell) in tracked {
            match cell.upgrade() {
                Some(cell) => {
                    if cell.remove_subscriber(self.id) {
                        released += 1;
                    }
                }
                None => trace!(consumer = %self.id, cell = %cell_id, "tracked cell already dropped"),
            }
        }
        released
    }
}

impl Subscriber for ConsumerInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn notify(&self) -> Result<()> {
        // Checked and released before calling out, so a synchronous re-render
        // can call back into this consumer.
        let phase = self.lifecycle.lock().phase();
        match phase {
            Phase::Mounted => {
                self.trigger.request_update();
                Ok(())
            }
            Phase::Unmounted => Err(ReactiveError::NotMounted(self.id)),
            Phase::TornDown => Err(ReactiveError::TornDown(self.id)),
        }
    }
}

/// Read-tracking and teardown bookkeeping for one UI component.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// use cellwire_core::reactive::{ObservableCell, ReactiveConsumer};
///
/// let renders = Arc::new(AtomicUsize::new(0));
/// let counter = renders.clone();
/// let consumer = ReactiveConsumer::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// let title = ObservableCell::new(String::from("draft"));
/// consumer.on_mount()?;
/// assert_eq!(consumer.tracked_read(&title)?, "draft");
///
/// title.write(String::from("final"));
/// assert_eq!(renders.load(Ordering::SeqCst), 1);
///
/// consumer.on_unmount()?;
/// title.write(String::from("archived"));
/// assert_eq!(renders.load(Ordering::SeqCst), 1);
/// # Ok::<(), cellwire_core::reactive::ReactiveError>(())
/// ```
pub struct ReactiveConsumer {
    inner: Arc<ConsumerInner>,
}

impl ReactiveConsumer {
    /// Create an unmounted consumer that calls `trigger` on every
    /// notification.
    pub fn new<F>(trigger: F) -> Self
    where
        F: UpdateTrigger + 'static,
    {
        Self::keyed(|_| trigger)
    }

    /// Create an unmounted consumer whose trigger needs to know the
    /// consumer's ID, e.g. to enqueue it on a
    /// [`RenderQueue`](crate::host::RenderQueue).
    pub fn keyed<F>(make_trigger: impl FnOnce(SubscriberId) -> F) -> Self
    where
        F: UpdateTrigger + 'static,
    {
        let id = SubscriberId::new();
        Self {
            inner: Arc::new(ConsumerInner {
                id,
                trigger: Box::new(make_trigger(id)),
                lifecycle: Mutex::new(Lifecycle::Unmounted),
            }),
        }
    }

    /// Get the consumer's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.inner.lifecycle.lock().phase()
    }

    /// Mount hook: start with an empty tracked set.
    ///
    /// Must run before the first render pass.
    pub fn on_mount(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Unmounted) {
            return Err(ReactiveError::InvalidTransition {
                consumer: self.inner.id,
                from: lifecycle.phase(),
                to: Phase::Mounted,
            });
        }

        *lifecycle = Lifecycle::Mounted(Tracked::new());
        debug!(consumer = %self.inner.id, "mounted");
        Ok(())
    }

    /// Unmount hook: unsubscribe from every tracked cell.
    ///
    /// The consumer is torn down before any cell is touched, so a write that
    /// races with teardown cannot trigger a render.
    pub fn on_unmount(&self) -> Result<()> {
        let tracked = self
            .inner
            .tear_down()
            .map_err(|from| ReactiveError::InvalidTransition {
                consumer: self.inner.id,
                from,
                to: Phase::TornDown,
            })?;

        let tracked_count = tracked.len();
        let released = self.inner.release(tracked);
        debug!(consumer = %self.inner.id, tracked_count, released, "torn down");
        Ok(())
    }

    /// Read `cell` and subscribe to it.
    ///
    /// This is the read render logic should use. Fails if the consumer is
    /// not mounted.
    pub fn tracked_read<T>(&self, cell: &ObservableCell<T>) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.track(cell)?;
        Ok(cell.get())
    }

    /// Record `cell` in the tracked set and subscribe to it.
    ///
    /// Every subscription goes through here, so the unmount hook sees all of
    /// them.
    pub(crate) fn track<T>(&self, cell: &ObservableCell<T>) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        // Held across the subscribe so teardown cannot slip in between
        // recording the cell and subscribing to it.
        let mut lifecycle = self.inner.lifecycle.lock();
        match &mut *lifecycle {
            Lifecycle::Mounted(tracked) => {
                tracked.entry(cell.id()).or_insert_with(|| cell.as_tracked());
            }
            Lifecycle::Unmounted => return Err(ReactiveError::NotMounted(self.inner.id)),
            Lifecycle::TornDown => return Err(ReactiveError::TornDown(self.inner.id)),
        }
        cell.attach(self.inner.id, self.as_subscriber());
        Ok(())
    }

    /// Forget `cell`. The caller removes the cell-side subscription.
    pub(crate) fn untrack(&self, cell: CellId) {
        if let Lifecycle::Mounted(tracked) = &mut *self.inner.lifecycle.lock() {
            tracked.shift_remove(&cell);
        }
    }

    /// Number of cells this consumer is subscribed to.
    pub fn tracked_count(&self) -> usize {
        match &*self.inner.lifecycle.lock() {
            Lifecycle::Mounted(tracked) => tracked.len(),
            _ => 0,
        }
    }

    /// Whether `cell` is in the tracked set.
    pub fn tracks<T>(&self, cell: &ObservableCell<T>) -> bool
    where
        T: Clone + Send + Sync + 'static,
    {
        match &*self.inner.lifecycle.lock() {
            Lifecycle::Mounted(tracked) => tracked.contains_key(&cell.id()),
            _ => false,
        }
    }

    pub(crate) fn as_subscriber(&self) -> Weak<dyn Subscriber> {
        let subscriber: Arc<dyn Subscriber> = self.inner.clone();
        Arc::downgrade(&subscriber)
    }
}

impl Drop for ReactiveConsumer {
    fn drop(&mut self) {
        // Covers a framework that skipped the unmount hook.
        if let Ok(tracked) = self.inner.tear_down() {
            warn!(
                consumer = %self.inner.id,
                tracked_count = tracked.len(),
                "consumer dropped while mounted, releasing subscriptions"
            );
            self.inner.release(tracked);
        }
    }
}

impl fmt::Debug for ReactiveConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveConsumer")
            .field("id", &self.inner.id)
            .field("phase", &self.phase())
            .field("tracked_count", &self.tracked_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_consumer() -> (ReactiveConsumer, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let consumer = ReactiveConsumer::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        (consumer, calls)
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        let (consumer, _) = counting_consumer();
        assert_eq!(consumer.phase(), Phase::Unmounted);

        consumer.on_mount().unwrap();
        assert_eq!(consumer.phase(), Phase::Mounted);

        assert_eq!(
            consumer.on_mount(),
            Err(ReactiveError::InvalidTransition {
                consumer: consumer.id(),
                from: Phase::Mounted,
                to: Phase::Mounted,
            })
        );

        consumer.on_unmount().unwrap();
        assert_eq!(consumer.phase(), Phase::TornDown);

        assert!(consumer.on_mount().is_err());
        assert!(consumer.on_unmount().is_err());
        assert_eq!(consumer.phase(), Phase::TornDown);
    }

    #[test]
    fn unmount_before_mount_is_rejected() {
        let (consumer, _) = counting_consumer();
        assert_eq!(
            consumer.on_unmount(),
            Err(ReactiveError::InvalidTransition {
                consumer: consumer.id(),
                from: Phase::Unmounted,
                to: Phase::TornDown,
            })
        );
        assert_eq!(consumer.phase(), Phase::Unmounted);
    }

    #[test]
    fn tracked_read_subscribes_both_ways() {
        let cell = ObservableCell::new(3);
        let (consumer, _) = counting_consumer();
        consumer.on_mount().unwrap();

        assert_eq!(consumer.tracked_read(&cell), Ok(3));
        assert!(consumer.tracks(&cell));
        assert!(cell.is_subscribed(&consumer));

        // Re-reading during a later render keeps one entry on each side.
        consumer.tracked_read(&cell).unwrap();
        assert_eq!(consumer.tracked_count(), 1);
        assert_eq!(cell.subscriber_count(), 1);
    }

    #[test]
    fn tracked_read_before_mount_fails() {
        let cell = ObservableCell::new(0);
        let (consumer, _) = counting_consumer();

        assert_eq!(
            consumer.tracked_read(&cell),
            Err(ReactiveError::NotMounted(consumer.id()))
        );
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn tracked_read_after_teardown_fails() {
        let cell = ObservableCell::new(0);
        let (consumer, _) = counting_consumer();
        consumer.on_mount().unwrap();
        consumer.on_unmount().unwrap();

        assert_eq!(
            consumer.tracked_read(&cell),
            Err(ReactiveError::TornDown(consumer.id()))
        );
        assert_eq!(cell.subscriber_count(), 0);
        assert_eq!(consumer.tracked_count(), 0);
    }

    #[test]
    fn unmount_releases_cells_of_mixed_types() {
        let count = ObservableCell::new(1u32);
        let label = ObservableCell::new(String::from("a"));
        let (consumer, calls) = counting_consumer();
        consumer.on_mount().unwrap();

        consumer.tracked_read(&count).unwrap();
        consumer.tracked_read(&label).unwrap();
        assert_eq!(consumer.tracked_count(), 2);

        consumer.on_unmount().unwrap();
        assert!(!count.is_subscribed(&consumer));
        assert!(!label.is_subscribed(&consumer));

        count.write(2);
        label.write(String::from("b"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unmount_tolerates_dropped_cells() {
        let (consumer, _) = counting_consumer();
        consumer.on_mount().unwrap();
        {
            let scoped = ObservableCell::new(0);
            consumer.tracked_read(&scoped).unwrap();
        }
        assert!(consumer.on_unmount().is_ok());
    }

    #[test]
    fn notification_to_torn_down_subscriber_is_rejected() {
        let cell = ObservableCell::new(0);
        let (consumer, calls) = counting_consumer();
        consumer.on_mount().unwrap();
        // Cell side only, as if teardown raced with the subscription.
        cell.attach(consumer.id(), consumer.as_subscriber());
        consumer.on_unmount().unwrap();
        assert!(cell.is_subscribed(&consumer));

        cell.write(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // The cell drops a subscriber that refuses notifications.
        assert!(!cell.is_subscribed(&consumer));
    }

    #[test]
    fn subscribe_before_mount_is_skipped() {
        let cell = ObservableCell::new(0);
        let (consumer, _) = counting_consumer();

        cell.subscribe(&consumer);
        assert!(!cell.is_subscribed(&consumer));
        assert_eq!(consumer.track(&cell), Err(ReactiveError::NotMounted(consumer.id())));
    }

    #[test]
    fn drop_while_mounted_releases_subscriptions() {
        let cell = ObservableCell::new(0);
        let (consumer, calls) = counting_consumer();
        consumer.on_mount().unwrap();
        consumer.tracked_read(&cell).unwrap();
        assert_eq!(cell.subscriber_count(), 1);

        drop(consumer);
        assert_eq!(cell.subscriber_count(), 0);

        cell.write(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn keyed_trigger_sees_own_id() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let consumer = ReactiveConsumer::keyed(move |id| {
            move || seen_clone.lock().push(id)
        });
        consumer.on_mount().unwrap();

        let cell = ObservableCell::new(0);
        consumer.tracked_read(&cell).unwrap();
        cell.write(1);

        assert_eq!(*seen.lock(), vec![consumer.id()]);
    }

    #[test]
    fn render_during_notification_sees_new_value() {
        let cell = ObservableCell::new(1);
        let observed = Arc::new(Mutex::new(Vec::new()));

        let cell_clone = cell.clone();
        let observed_clone = observed.clone();
        let consumer = ReactiveConsumer::new(move || {
            observed_clone.lock().push(cell_clone.get());
        });
        consumer.on_mount().unwrap();
        consumer.tracked_read(&cell).unwrap();

        cell.write(2);
        assert_eq!(*observed.lock(), vec![2]);
    }
}
