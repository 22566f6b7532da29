//! Error types for the reactive system.
//!
//! Every failure here is a usage error reported at the call that caused it.
//! Nothing in the core performs I/O, so nothing is retried.

use thiserror::Error;

use super::consumer::Phase;
use super::subscriber::SubscriberId;

/// Errors raised by consumers and hosts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// The consumer was used before its mount hook ran.
    #[error("{0} has not been mounted")]
    NotMounted(SubscriberId),

    /// The consumer was used after its unmount hook ran.
    #[error("{0} has been torn down")]
    TornDown(SubscriberId),

    /// A lifecycle hook was called out of order or more than once.
    #[error("{consumer} cannot move from {from} to {to}")]
    InvalidTransition {
        consumer: SubscriberId,
        from: Phase,
        to: Phase,
    },

    /// Render passes kept requesting further renders.
    #[error("updates did not settle after {rounds} render rounds")]
    UpdateCycle { rounds: usize },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
