//! Cellwire Core
//!
//! This crate connects mutable observable state to component-based UI
//! render trees. It implements:
//!
//! - Observable cells that track which consumers have read them
//! - Reactive consumers that re-render when a cell they read changes, and
//!   release every subscription when torn down
//! - A coalescing render queue for hosts that do not batch update requests
//!
//! The UI framework itself stays outside: it supplies an update trigger and
//! calls the mount/unmount hooks.
//!
//! # Architecture
//!
//! - `reactive`: cells, consumers, and the subscription protocol between them
//! - `host`: helpers for the framework side of the boundary
//!
//! # Example
//!
//! ```rust
//! use cellwire_core::host::RenderQueue;
//! use cellwire_core::reactive::{ObservableCell, ReactiveConsumer};
//!
//! // State is a plain value handed to whoever needs it.
//! let clock = ObservableCell::new(0u64);
//!
//! let queue = RenderQueue::new();
//! let clock_view = ReactiveConsumer::keyed(|id| queue.trigger(id));
//! clock_view.on_mount()?;
//!
//! // Render pass: reading subscribes.
//! assert_eq!(clock_view.tracked_read(&clock)?, 0);
//!
//! clock.write(1);
//! clock.write(2);
//! assert_eq!(queue.take_pending(), vec![clock_view.id()]);
//!
//! clock_view.on_unmount()?;
//! assert_eq!(clock.subscriber_count(), 0);
//! # Ok::<(), cellwire_core::reactive::ReactiveError>(())
//! ```

pub mod host;
pub mod reactive;
