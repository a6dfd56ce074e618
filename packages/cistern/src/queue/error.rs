// queue error types.

use std::fmt::{self, Debug, Display, Formatter};
use thiserror::Error;


// ==== base error types ====


/// Error for trying to use a queue which has been shut down
///
/// This is how the queue reports cancellation. It is not a recoverable condition: once a queue
/// has been shut down, every operation on it fails with this error, including operations which
/// were already suspended when [`shutdown`](crate::Queue::shutdown) was called.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
#[error("queue has been shut down")]
pub struct CancelledError;

/// Error for attempting to use a queue with no or limited blocking, and the operation not
/// completing immediately or by the specified deadline
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
#[error("operation would block")]
pub struct WouldBlockError;


// ==== compound error types ====


macro_rules! compound_from {
    ($compound:ident {$(
        $variant:ident($inner:ty),
    )*})=>{$(
        impl From<$inner> for $compound {
            fn from(inner: $inner) -> Self {
                Self::$variant(inner)
            }
        }
    )*};
}

/// Error for trying to use a queue with no or limited blocking
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
pub enum TryError {
    /// The queue has been shut down
    #[error(transparent)]
    Cancelled(CancelledError),
    /// The operation could not be resolved immediately or by the specified deadline
    #[error(transparent)]
    WouldBlock(WouldBlockError),
}

compound_from!(TryError {
    Cancelled(CancelledError),
    WouldBlock(WouldBlockError),
});

/// Error for trying to offer into a queue with no or limited blocking
///
/// If the offer was suspended by backpressure when it gave up, the elements which had not yet
/// been placed into the queue are handed back in `rescinded`. Elements of the same batch which
/// were already placed stay in the queue.
#[derive(Clone, Eq, PartialEq)]
pub struct TryOfferError<T> {
    /// The elements that were withdrawn without having been placed
    pub rescinded: Vec<T>,
    /// The reason the offer did not complete
    pub cause: TryError,
}

impl<T> Debug for TryOfferError<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("TryOfferError")
            .field("rescinded", &self.rescinded.len())
            .field("cause", &self.cause)
            .finish()
    }
}

impl<T> Display for TryOfferError<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} ({} elements rescinded)", self.cause, self.rescinded.len())
    }
}

impl<T> std::error::Error for TryOfferError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Error for operations on a derived queue
///
/// Derived queues apply user-supplied transforms to elements. Those transforms may fail, which
/// is reported separately from the queue itself having been shut down.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The underlying queue has been shut down
    #[error(transparent)]
    Cancelled(#[from] CancelledError),
    /// An element transform failed
    #[error(transparent)]
    Transform(anyhow::Error),
}

impl QueueError {
    /// Whether this error is the queue having been shut down
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::Cancelled(_))
    }
}
