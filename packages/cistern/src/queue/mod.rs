// implementation of the cistern queue.
//
// a queue handle wraps Arc<shared state>, where all mutable state sits behind a single mutex:
//
//       shared state
//          |
//          |------ an atomic shutdown flag, for failing fast without locking
//          |
//          \------ the lockable state
//                     |
//                     |------ a ring_store::RingStore<T>, the plain not-itself-concurrent buffer
//                     |       of elements. bounded or unbounded.
//                     |
//                     |------ a "taker list": a waiter_list::WaiterList<T> of consumers suspended
//                     |       on an empty store, in the order they started waiting.
//                     |
//                     |------ the strategy::OverflowStrategy<T>, which decides what happens to
//                     |       elements that don't fit. for backpressure, it owns its own waiter
//                     |       list of suspended producers, and their elements.
//                     |
//                     \------ a waiter list of tasks waiting for shutdown.
//
// whenever an element or free capacity appears, core reconciles the store against the taker list
// while still holding the lock, so that it is never observable to contain both a buffered
// element and a suspended consumer.
//
// the organization of these modules is as such:
//
//      ring_store<-----------\
//                            |
//      waiter_list<----------core: Owns the lock and the reconciliation. Presents low-level
//                            |     futures which are safe but panicky and inconvenient.
//      strategy<-------------/     ^
//                                  |
//      polling<--------------------api: Wrapper around core that is convenient and defensive,
//                                       including a blocking layer. The crate re-exports this
//                                       API publically.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;
pub(crate) mod strategy;

mod ring_store;
mod waiter_list;
mod polling;
mod core;
