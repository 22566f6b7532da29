//! Render Queue
//!
//! Cells notify synchronously, once per change. A component that reads three
//! cells which all change before the next frame gets three update requests,
//! but should render once. The queue collapses those requests.
//!
//! # Algorithm
//!
//! 1. Each consumer's trigger inserts its ID into an ordered set. Repeated
//!    requests for an already pending ID are absorbed.
//! 2. `flush` takes the whole set and renders each ID once, in first-request
//!    order.
//! 3. Renders may write cells and enqueue more requests; those are picked up
//!    by the next round. Flushing stops once a round finds the queue empty, or
//!    fails after `max_rounds` rounds.

use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::reactive::{ReactiveError, Result, SubscriberId, UpdateTrigger};

/// Rounds `flush` runs before giving up on an update cycle.
pub const DEFAULT_MAX_ROUNDS: usize = 64;

/// Coalescing queue of pending re-render requests.
///
/// Cloning produces another handle to the same queue.
#[derive(Debug, Clone)]
pub struct RenderQueue {
    pending: Arc<Mutex<IndexSet<SubscriberId>>>,
    max_rounds: usize,
}

impl RenderQueue {
    /// Create an empty queue with the default cycle bound.
    pub fn new() -> Self {
        Self::with_max_rounds(DEFAULT_MAX_ROUNDS)
    }

    /// Create an empty queue that gives up after `max_rounds` flush rounds.
    pub fn with_max_rounds(max_rounds: usize) -> Self {
        Self {
            pending: Arc::new(Mutex::new(IndexSet::new())),
            max_rounds,
        }
    }

    /// An update trigger that enqueues `id`.
    pub fn trigger(&self, id: SubscriberId) -> QueuedTrigger {
        QueuedTrigger {
            queue: self.clone(),
            id,
        }
    }

    /// Mark `id` as needing a render.
    ///
    /// Returns `false` if it was already pending.
    pub fn request(&self, id: SubscriberId) -> bool {
        let inserted = self.pending.lock().insert(id);
        trace!(consumer = %id, coalesced = !inserted, "render requested");
        inserted
    }

    /// Whether `id` is waiting for a render.
    pub fn is_pending(&self, id: SubscriberId) -> bool {
        self.pending.lock().contains(&id)
    }

    /// Number of distinct consumers waiting for a render.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Take every pending ID, once each, in first-request order.
    pub fn take_pending(&self) -> Vec<SubscriberId> {
        let pending = std::mem::take(&mut *self.pending.lock());
        pending.into_iter().collect()
    }

    /// Render pending consumers until no requests remain.
    ///
    /// Returns the number of renders performed. A render error stops the
    /// flush and is returned; the rest of that round's batch is discarded.
    pub fn flush<F>(&self, mut render: F) -> Result<usize>
    where
        F: FnMut(SubscriberId) -> Result<()>,
    {
        let mut rendered = 0;
        for round in 0..self.max_rounds {
            let batch = self.take_pending();
            if batch.is_empty() {
                debug!(rounds = round, rendered, "render queue settled");
                return Ok(rendered);
            }
            for id in batch {
                render(id)?;
                rendered += 1;
            }
        }

        if self.is_empty() {
            Ok(rendered)
        } else {
            Err(ReactiveError::UpdateCycle {
                rounds: self.max_rounds,
            })
        }
    }
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Update trigger bound to one consumer and one queue.
#[derive(Debug, Clone)]
pub struct QueuedTrigger {
    queue: RenderQueue,
    id: SubscriberId,
}

impl UpdateTrigger for QueuedTrigger {
    fn request_update(&self) {
        self.queue.request(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ObservableCell, ReactiveConsumer};

    #[test]
    fn repeated_requests_coalesce() {
        let queue = RenderQueue::new();
        let id = SubscriberId::new();

        assert!(queue.request(id));
        assert!(!queue.request(id));
        assert!(!queue.request(id));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.take_pending(), vec![id]);
        assert!(queue.is_empty());
    }

    #[test]
    fn pending_keeps_first_request_order() {
        let queue = RenderQueue::new();
        let a = SubscriberId::new();
        let b = SubscriberId::new();

        queue.request(b);
        queue.request(a);
        queue.request(b);

        assert_eq!(queue.take_pending(), vec![b, a]);
    }

    #[test]
    fn writes_to_several_cells_render_once() {
        let queue = RenderQueue::new();
        let consumer = ReactiveConsumer::keyed(|id| queue.trigger(id));
        consumer.on_mount().unwrap();

        let width = ObservableCell::new(10);
        let height = ObservableCell::new(20);
        consumer.tracked_read(&width).unwrap();
        consumer.tracked_read(&height).unwrap();

        width.write(11);
        height.write(21);
        width.write(12);
        assert!(queue.is_pending(consumer.id()));

        let mut renders = Vec::new();
        let count = queue
            .flush(|id| {
                renders.push(id);
                Ok(())
            })
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(renders, vec![consumer.id()]);
    }

    #[test]
    fn flush_picks_up_requests_made_while_rendering() {
        let queue = RenderQueue::new();
        let first = SubscriberId::new();
        let second = SubscriberId::new();
        queue.request(first);

        let inner = queue.clone();
        let count = queue
            .flush(|id| {
                if id == first {
                    inner.request(second);
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(count, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn flush_stops_runaway_cycles() {
        let queue = RenderQueue::with_max_rounds(3);
        let id = SubscriberId::new();
        queue.request(id);

        let inner = queue.clone();
        let result = queue.flush(|id| {
            inner.request(id);
            Ok(())
        });

        assert_eq!(result, Err(ReactiveError::UpdateCycle { rounds: 3 }));
    }

    #[test]
    fn flush_propagates_render_errors() {
        let queue = RenderQueue::new();
        let id = SubscriberId::new();
        queue.request(id);

        let result = queue.flush(|id| Err(ReactiveError::TornDown(id)));
        assert_eq!(result, Err(ReactiveError::TornDown(id)));
    }
}
