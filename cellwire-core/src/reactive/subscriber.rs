//! Subscriber types for the reactive system.
//!
//! A subscriber is anything a cell can notify when its value changes. In
//! practice this is a [`ReactiveConsumer`](super::ReactiveConsumer) embedded
//! in a UI component, which forwards the notification to the framework's
//! update trigger.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::Result;

/// Unique identifier for a subscriber.
///
/// Each consumer gets a unique ID when created. Cells key their subscriber
/// sets by this ID, which is what makes subscribing twice a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer#{}", self.0)
    }
}

/// The UI framework's request-update primitive.
///
/// Called once per notification. It may be called any number of times
/// before the next render pass; the framework (or a
/// [`RenderQueue`](crate::host::RenderQueue)) is expected to coalesce the
/// requests into one up-to-date render.
pub trait UpdateTrigger: Send + Sync {
    /// Ask the framework to re-render the owning component.
    fn request_update(&self);
}

impl<F> UpdateTrigger for F
where
    F: Fn() + Send + Sync,
{
    fn request_update(&self) {
        self()
    }
}

/// Receiving end of a cell notification.
///
/// Cells only ever hold subscribers weakly, so implementors must be owned
/// elsewhere (behind an `Arc`).
pub(crate) trait Subscriber: Send + Sync {
    fn subscriber_id(&self) -> SubscriberId;

    /// Deliver a change notification.
    ///
    /// Returning an error tells the cell this subscriber can no longer
    /// receive notifications and should be dropped from its set.
    fn notify(&self) -> Result<()>;
}
