//! Asynchronous bounded and unbounded FIFO queues with configurable overflow strategies
//!
//! A [`Queue`] is shared by any number of producers and consumers. Consumers suspend while it is
//! empty. What producers do when a bounded queue is full is decided by its [`Strategy`]: wait for
//! room, drop the new elements, or evict the oldest ones. Every operation is a future which can
//! also be driven from plain threads through its blocking methods.

#[macro_use]
extern crate tracing;

mod queue;
#[cfg(feature = "futures")]
pub mod combinators;

pub use crate::queue::{
    api::*,
    strategy::Strategy,
};

/// Error types
pub mod error {
    pub use crate::queue::error::*;
}

/// Future types
pub mod future {
    pub use crate::queue::api::future::*;
}
