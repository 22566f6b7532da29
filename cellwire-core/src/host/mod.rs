//! Host-side helpers
//!
//! The UI framework owns rendering; cellwire only needs a way to ask it for
//! an update. Frameworks that already coalesce update requests can pass any
//! closure as the trigger. Frameworks that do not can route triggers through
//! a [`RenderQueue`], which turns any number of requests for one component
//! into a single pending render.

mod queue;

pub use queue::{QueuedTrigger, RenderQueue, DEFAULT_MAX_ROUNDS};
