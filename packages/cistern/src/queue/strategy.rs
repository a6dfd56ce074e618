// overflow strategies: what happens to offered elements that don't fit in a full store.

use super::{
    error::CancelledError,
    ring_store::RingStore,
    waiter_list::{WaiterKey, WaiterList, WaiterState},
};
use smallvec::SmallVec;
use std::{
    collections::VecDeque,
    task::{Context, Poll},
};


/// Policy for elements offered to a bounded queue while it is full
///
/// The strategy is chosen when the queue is constructed and never changes afterwards.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Strategy {
    /// Suspend producers until consumers make room
    ///
    /// Blocked producers are released in the order they were blocked.
    #[default]
    BackPressure,
    /// Discard the newly offered elements, reporting `false` to the producer
    Dropping,
    /// Evict the oldest buffered elements to make room for the new ones
    Sliding,
}

// elements travelling through one offer operation. a single offer stays inline.
pub(crate) type Batch<T> = SmallVec<[T; 1]>;

// what the strategy decided for a batch of surplus elements.
pub(crate) enum SurplusOutcome {
    // the offer is resolved with this result.
    Resolved(bool),
    // the producer must suspend on this waiter in the strategy's putter list.
    Suspended(WaiterKey),
}

// what became of a producer which gave up on its offer.
#[derive(Debug, PartialEq)]
pub(crate) enum Withdrawal<T> {
    // it was still waiting. these elements of its batch were never placed, in order.
    Unplaced(Batch<T>),
    // it had already been settled, so the offer resolved with this result after all.
    Settled(Result<bool, CancelledError>),
}

// per-queue strategy state.
pub(crate) enum OverflowStrategy<T> {
    BackPressure(BackPressure<T>),
    Dropping,
    Sliding,
}

// backlog of producers blocked on a full store.
pub(crate) struct BackPressure<T> {
    // surplus elements in offer order.
    puts: VecDeque<PendingPut<T>>,
    // one waiter per blocked offer. every put of a batch shares its offer's waiter.
    putters: WaiterList<bool>,
}

struct PendingPut<T> {
    elem: T,
    // the offer this element belongs to.
    waiter: WaiterKey,
    // whether placing this element completes the producer's offer.
    is_last: bool,
}

impl<T> OverflowStrategy<T> {
    pub(crate) fn new(strategy: Strategy) -> Self {
        match strategy {
            Strategy::BackPressure => OverflowStrategy::BackPressure(BackPressure {
                puts: VecDeque::new(),
                putters: WaiterList::new(),
            }),
            Strategy::Dropping => OverflowStrategy::Dropping,
            Strategy::Sliding => OverflowStrategy::Sliding,
        }
    }

    // deal with elements which didn't fit because the store is full.
    pub(crate) fn handle_surplus(
        &mut self,
        surplus: Batch<T>,
        store: &mut RingStore<T>,
    ) -> SurplusOutcome {
        debug_assert!(!surplus.is_empty());
        match self {
            OverflowStrategy::Dropping => {
                trace!(dropped = surplus.len(), "queue full, dropping offered elements");
                SurplusOutcome::Resolved(false)
            }
            OverflowStrategy::Sliding => {
                slide(surplus, store);
                SurplusOutcome::Resolved(true)
            }
            OverflowStrategy::BackPressure(bp) => {
                let waiter = bp.putters.push();
                let n = surplus.len();
                bp.puts.extend(surplus.into_iter().enumerate().map(|(i, elem)| PendingPut {
                    elem,
                    waiter,
                    is_last: i + 1 == n,
                }));
                trace!(pending = n, "queue full, suspending producer");
                // space may have opened up since the store rejected the surplus
                bp.on_store_emptied(store);
                SurplusOutcome::Suspended(waiter)
            }
        }
    }

    // called whenever the store may have gained free capacity.
    pub(crate) fn on_store_emptied(&mut self, store: &mut RingStore<T>) {
        if let OverflowStrategy::BackPressure(bp) = self {
            bp.on_store_emptied(store);
        }
    }

    // hand the oldest surplus element directly to a consumer. only ever yields anything when the
    // store is empty yet producers are blocked, which happens with zero capacity.
    pub(crate) fn take_surplus(&mut self) -> Option<T> {
        let OverflowStrategy::BackPressure(bp) = self else { return None };
        let put = bp.puts.pop_front()?;
        bp.release(put.waiter, put.is_last);
        Some(put.elem)
    }

    // number of elements held by the strategy outside the store.
    pub(crate) fn surplus_size(&self) -> usize {
        match self {
            OverflowStrategy::BackPressure(bp) => bp.puts.len(),
            OverflowStrategy::Dropping | OverflowStrategy::Sliding => 0,
        }
    }

    // poll a producer suspended by handle_surplus.
    pub(crate) fn poll_putter(
        &mut self,
        waiter: WaiterKey,
        cx: &mut Context,
    ) -> Poll<Result<bool, CancelledError>> {
        match self {
            OverflowStrategy::BackPressure(bp) => bp.putters.poll(waiter, cx),
            _ => unreachable!("producer suspended without backpressure (internal bug)"),
        }
    }

    // abandon a suspended producer. removes every element of its batch that was not yet placed
    // and returns them, in order. if the producer was settled first, reports that outcome instead.
    pub(crate) fn withdraw(&mut self, waiter: WaiterKey) -> Withdrawal<T> {
        let OverflowStrategy::BackPressure(bp) = self
        else { return Withdrawal::Unplaced(Batch::new()) };
        let mut withdrawn = Batch::new();
        let mut kept = VecDeque::with_capacity(bp.puts.len());
        for put in bp.puts.drain(..) {
            if put.waiter == waiter {
                withdrawn.push(put.elem);
            } else {
                kept.push_back(put);
            }
        }
        bp.puts = kept;
        match bp.putters.remove(waiter) {
            Some(WaiterState::Completed(accepted)) => {
                debug_assert!(
                    withdrawn.is_empty(),
                    "producer released with puts still pending (internal bug)",
                );
                Withdrawal::Settled(Ok(accepted))
            }
            Some(WaiterState::Cancelled) => Withdrawal::Settled(Err(CancelledError)),
            Some(WaiterState::Pending) | None => {
                if !withdrawn.is_empty() {
                    trace!(withdrawn = withdrawn.len(), "producer abandoned offer");
                }
                Withdrawal::Unplaced(withdrawn)
            }
        }
    }

    // cancel every blocked producer and drop the backlog.
    pub(crate) fn shutdown(&mut self) {
        if let OverflowStrategy::BackPressure(bp) = self {
            let producers = bp.putters.len();
            bp.putters.cancel_all();
            bp.puts.clear();
            if producers > 0 {
                debug!(producers, "cancelled blocked producers");
            }
        }
    }
}

impl<T> BackPressure<T> {
    // move backlog into the store while it has room, releasing producers whose batches are
    // fully placed.
    fn on_store_emptied(&mut self, store: &mut RingStore<T>) {
        while !store.is_full() {
            let Some(put) = self.puts.pop_front() else { break };
            let waiter = put.waiter;
            let is_last = put.is_last;
            if let Err(elem) = store.offer(put.elem) {
                self.puts.push_front(PendingPut { elem, waiter, is_last });
                break;
            }
            self.release(waiter, is_last);
        }
    }

    // complete the producer's offer if this was the last element of its batch.
    fn release(&mut self, waiter: WaiterKey, is_last: bool) {
        if is_last {
            let completed = self.putters.complete(waiter, true);
            debug_assert!(completed.is_ok(), "released producer twice (internal bug)");
            trace!("releasing blocked producer");
        }
    }
}

// place every element, evicting the oldest stored element whenever the store is full. with zero
// capacity nothing can be stored and the elements are discarded.
fn slide<T>(surplus: Batch<T>, store: &mut RingStore<T>) {
    if store.capacity() == Some(0) {
        trace!(dropped = surplus.len(), "zero capacity, discarding offered elements");
        return;
    }
    let mut evicted = 0usize;
    for mut elem in surplus {
        while let Err(rejected) = store.offer(elem) {
            elem = rejected;
            if store.poll().is_some() {
                evicted += 1;
            }
        }
    }
    trace!(evicted, "queue full, evicted oldest elements");
}
