//! Reactive Primitives
//!
//! This module implements the bridge between observable state and UI
//! components: cells that remember who read them, and consumers that
//! re-render when something they read changes.
//!
//! # Concepts
//!
//! ## Cells
//!
//! An [`ObservableCell`] is a container for mutable state. When a consumer
//! reads it through a tracked read, the cell registers that consumer as a
//! subscriber. When the cell's value changes, every subscriber is notified.
//!
//! ## Consumers
//!
//! A [`ReactiveConsumer`] lives inside a UI component. Its render logic reads
//! cells with [`ReactiveConsumer::tracked_read`]; there is no separate step
//! declaring dependencies. A notification calls the component's
//! [`UpdateTrigger`]. On unmount the consumer unsubscribes from every cell it
//! read.
//!
//! # Implementation Notes
//!
//! The relation is kept on both sides: each cell holds its subscribers
//! weakly, each consumer holds its tracked cells weakly. Neither keeps the
//! other alive, and a consumer dropped without its unmount hook still
//! releases its subscriptions.

mod cell;
mod consumer;
mod error;
mod subscriber;

pub use cell::{ptr_eq, CellId, ObservableCell};
pub use consumer::{Phase, ReactiveConsumer};
pub use error::{ReactiveError, Result};
pub use subscriber::{SubscriberId, UpdateTrigger};
