// minimal safe API for the queue. the exposed API is a convenience wrapper around this.

use super::{
    error::CancelledError,
    polling::DropWakers,
    ring_store::RingStore,
    strategy::{Batch, OverflowStrategy, Strategy, SurplusOutcome, Withdrawal},
    waiter_list::{WaiterKey, WaiterList, WaiterState},
};
use std::{
    collections::VecDeque,
    future::Future,
    mem::replace,
    pin::Pin,
    sync::{
        atomic::{
            Ordering::Relaxed,
            AtomicBool,
        },
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    task::{Context, Poll},
};


// handle to a queue.
pub(crate) struct Queue<T>(Arc<Shared<T>>);

// queue shared state.
struct Shared<T> {
    // mutex around lockable state.
    lockable: Mutex<Lockable<T>>,

    // begins false. may eventually change to true.
    //
    // - only ever changes while the lock is held, and once true never changes again.
    // - true if and only if the taker list and the strategy's producers have been cancelled and
    //   the shutdown waiters have been completed.
    // - if true, operations immediately resolve to cancelled. reading it without the lock is
    //   only good for failing fast, and must be repeated once locked.
    shutdown: AtomicBool,

    // the strategy this queue was constructed with.
    strategy: Strategy,
    // capacity of the store, or none if unbounded.
    capacity: Option<usize>,
}

// queue lockable state.
struct Lockable<T> {
    // storage for elements.
    elems: RingStore<T>,
    // elements given back by abandoned consumers which found no room in the store. these sit
    // ahead of the store and may push the queue past its capacity. invariant: non-empty only if
    // takers is empty.
    reinstated: VecDeque<T>,
    // consumers waiting for an element. invariant: when no lock is held, non-empty only if elems
    // is empty.
    takers: WaiterList<T>,
    // strategy state, including any producers it has suspended.
    overflow: OverflowStrategy<T>,
    // tasks waiting for the queue to shut down.
    shutdown_waiters: WaiterList<()>,
}

impl<T> Queue<T> {
    // construct empty. a bound of none means unbounded, in which case the strategy is never
    // consulted.
    pub(crate) fn new(bound: Option<usize>, strategy: Strategy) -> Self {
        let elems = match bound {
            Some(capacity) => RingStore::bounded(capacity),
            None => RingStore::unbounded(),
        };
        Queue(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                elems,
                reinstated: VecDeque::new(),
                takers: WaiterList::new(),
                overflow: OverflowStrategy::new(strategy),
                shutdown_waiters: WaiterList::new(),
            }),
            shutdown: AtomicBool::new(false),
            strategy,
            capacity: bound,
        }))
    }

    // atomic-read the shutdown flag.
    pub(crate) fn is_shutdown(&self) -> bool {
        self.0.shutdown.load(Relaxed)
    }

    pub(crate) fn strategy(&self) -> Strategy {
        self.0.strategy
    }

    // capacity of the store, or none if unbounded.
    pub(crate) fn capacity(&self) -> Option<usize> {
        self.0.capacity
    }

    // lock the queue.
    pub(crate) fn lock(&self) -> Lock<'_, T> {
        Lock {
            shared: &self.0,
            lock: lock(&self.0),
        }
    }

    // construct an offer future for a batch of elements. does not touch the queue until polled.
    pub(crate) fn offer(&self, elems: Batch<T>) -> Offer<T> {
        Offer { queue: self.clone(), state: OfferState::Unpolled(elems) }
    }

    // construct a take future. does not touch the queue until polled.
    pub(crate) fn take(&self) -> Take<T> {
        Take { queue: self.clone(), state: TakeState::Unpolled }
    }

    // construct a future which resolves once the queue is shut down.
    pub(crate) fn await_shutdown(&self) -> AwaitShutdown<T> {
        AwaitShutdown { queue: self.clone(), state: TakeState::Unpolled }
    }
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Queue(Arc::clone(&self.0))
    }
}

// lock the shared state. no queue invariant is left broken at any point a waker could panic, so
// a poisoned mutex is safe to keep using.
fn lock<T>(shared: &Shared<T>) -> MutexGuard<'_, Lockable<T>> {
    shared.lockable.lock().unwrap_or_else(PoisonError::into_inner)
}

// lock on a queue.
pub(crate) struct Lock<'a, T> {
    shared: &'a Arc<Shared<T>>,
    lock: MutexGuard<'a, Lockable<T>>,
}

impl<'a, T> Lock<'a, T> {
    fn check_shutdown(&self) -> Result<(), CancelledError> {
        if self.shared.shutdown.load(Relaxed) {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }

    // logical size: buffered elements, minus waiting consumers, plus surplus held by the strategy.
    pub(crate) fn size(&self) -> Result<isize, CancelledError> {
        self.check_shutdown()?;
        let stored = (self.lock.reinstated.len() + self.lock.elems.len()) as isize;
        let takers = self.lock.takers.len() as isize;
        let surplus = self.lock.overflow.surplus_size() as isize;
        Ok(stored - takers + surplus)
    }

    // drain up to `max` buffered elements without suspending.
    pub(crate) fn take_up_to(&mut self, max: usize) -> Result<Vec<T>, CancelledError> {
        self.check_shutdown()?;
        let lockable = &mut *self.lock;
        let reinstated = max.min(lockable.reinstated.len());
        let mut elems = lockable.reinstated.drain(..reinstated).collect::<Vec<_>>();
        elems.extend(lockable.elems.poll_up_to(max - reinstated));
        lockable.refill();
        Ok(elems)
    }

    // drain every buffered element without suspending.
    pub(crate) fn take_all(&mut self) -> Result<Vec<T>, CancelledError> {
        self.check_shutdown()?;
        let mut elems = Vec::from(std::mem::take(&mut self.lock.reinstated));
        elems.extend(self.lock.elems.poll_all());
        self.lock.refill();
        Ok(elems)
    }

    // shut the queue down. returns whether this call was the one to do so.
    pub(crate) fn shutdown(&mut self) -> bool {
        if self.shared.shutdown.load(Relaxed) {
            return false;
        }
        self.shared.shutdown.store(true, Relaxed);
        let takers = self.lock.takers.len();
        self.lock.takers.cancel_all();
        self.lock.reinstated.clear();
        self.lock.overflow.shutdown();
        self.lock.shutdown_waiters.complete_all(());
        debug!(takers, "queue shut down");
        true
    }
}

impl<T> Lockable<T> {
    // let the strategy push backlog into newly free capacity, then hand anything that arrived to
    // waiting consumers.
    fn refill(&mut self) {
        self.overflow.on_store_emptied(&mut self.elems);
        self.complete_takers();
    }

    // match waiting consumers against buffered elements, in order, until one side runs out.
    fn complete_takers(&mut self) {
        while !self.takers.is_empty() {
            if let Some(elem) = self.reinstated.pop_front() {
                let handed = self.takers.complete_front(elem);
                debug_assert!(handed.is_ok(), "taker list emptied while locked (internal bug)");
                continue;
            }
            let Some(elem) = self.elems.poll() else { break };
            let handed = self.takers.complete_front(elem);
            debug_assert!(handed.is_ok(), "taker list emptied while locked (internal bug)");
            self.overflow.on_store_emptied(&mut self.elems);
        }
    }

    // place a batch: first directly into waiting consumers, then into the store, and only what
    // is left over goes to the strategy.
    fn offer_all(&mut self, elems: Batch<T>) -> SurplusOutcome {
        let mut elems = elems.into_iter();

        // hand directly to waiting consumers
        if self.reinstated.is_empty() && self.elems.is_empty() {
            while !self.takers.is_empty() {
                let Some(elem) = elems.next() else { break };
                let handed = self.takers.complete_front(elem);
                debug_assert!(handed.is_ok(), "taker list emptied while locked (internal bug)");
            }
        }

        // store what fits. once the store rejects an element, everything after it is surplus too.
        let mut surplus = Batch::new();
        for elem in elems {
            if !surplus.is_empty() {
                surplus.push(elem);
            } else if let Err(elem) = self.elems.offer(elem) {
                surplus.push(elem);
            }
        }
        self.complete_takers();

        if surplus.is_empty() {
            return SurplusOutcome::Resolved(true);
        }
        let outcome = self.overflow.handle_surplus(surplus, &mut self.elems);
        self.complete_takers();
        outcome
    }

    // take the next element without suspending, if there is one.
    fn poll_elem(&mut self) -> Option<T> {
        if let Some(elem) = self.reinstated.pop_front() {
            return Some(elem);
        }
        if let Some(elem) = self.elems.poll() {
            self.overflow.on_store_emptied(&mut self.elems);
            return Some(elem);
        }
        self.overflow.take_surplus()
    }

    // return an element that was handed to a consumer which then gave up without receiving it.
    // it goes to the next waiting consumer, else back to the head of the queue, even if full.
    fn reinstate(&mut self, elem: T) {
        let Err(elem) = self.takers.complete_front(elem) else { return };
        if self.reinstated.is_empty() {
            let Err(elem) = self.elems.push_front(elem) else { return };
            trace!("queue full, holding element returned by abandoned take ahead of the store");
            self.reinstated.push_front(elem);
        } else {
            self.reinstated.push_front(elem);
        }
    }
}


// ==== futures ====


// offer future. internally locks the queue when polled or cancelled.
pub(crate) struct Offer<T> {
    queue: Queue<T>,
    state: OfferState<T>,
}

enum OfferState<T> {
    // elements not yet offered.
    Unpolled(Batch<T>),
    // suspended by backpressure on this waiter.
    Suspended(WaiterKey),
    // resolved or cancelled.
    Terminated,
}

// there is no structural pinning.
impl<T> Unpin for Offer<T> {}

impl<T> Offer<T> {
    // poll the future.
    //
    // - resolves to whether the elements were accepted (false iff dropped by the strategy).
    // - resolves to cancelled if the queue is or becomes shut down while suspended.
    //
    // internally locks the queue. panics if already resolved or cancelled.
    pub(crate) fn poll(&mut self, cx: &mut Context) -> Poll<Result<bool, CancelledError>> {
        let (waiter, mut guard) = match replace(&mut self.state, OfferState::Terminated) {
            OfferState::Terminated => panic!("offer future polled after already resolved or cancelled"),
            OfferState::Unpolled(elems) => {
                if self.queue.is_shutdown() {
                    return Poll::Ready(Err(CancelledError));
                }
                let mut lock = self.queue.lock();
                // now that the queue is locked, we can check for shutdown without race conditions
                lock.check_shutdown()?;
                match lock.lock.offer_all(elems) {
                    SurplusOutcome::Resolved(accepted) => return Poll::Ready(Ok(accepted)),
                    SurplusOutcome::Suspended(waiter) => (waiter, lock.lock),
                }
            }
            OfferState::Suspended(waiter) => (waiter, lock(&self.queue.0)),
        };

        let poll = guard.overflow.poll_putter(waiter, cx);
        if poll.is_pending() {
            self.state = OfferState::Suspended(waiter);
        }
        poll
    }

    // if not already resolved or cancelled, cancel the future and return whichever elements were
    // never placed into the queue. if the offer was settled before it could be cancelled, its
    // outcome is returned instead.
    //
    // internally locks the queue if suspended. never panics. guaranteed that all wakers
    // previously cloned when polling are dropped by the time `cancel` returns.
    pub(crate) fn cancel(&mut self) -> Withdrawal<T> {
        match replace(&mut self.state, OfferState::Terminated) {
            OfferState::Unpolled(elems) => Withdrawal::Unplaced(elems),
            OfferState::Suspended(waiter) => lock(&self.queue.0).overflow.withdraw(waiter),
            OfferState::Terminated => Withdrawal::Unplaced(Batch::new()),
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self.state, OfferState::Terminated)
    }
}


// take future. internally locks the queue when polled or cancelled.
pub(crate) struct Take<T> {
    queue: Queue<T>,
    state: TakeState,
}

#[derive(Copy, Clone)]
enum TakeState {
    Unpolled,
    // suspended on this waiter.
    Suspended(WaiterKey),
    // resolved or cancelled.
    Terminated,
}

impl<T> Take<T> {
    // poll the future.
    //
    // - resolves to the next element.
    // - resolves to cancelled if the queue is or becomes shut down while suspended. a consumer
    //   that was handed an element before shutdown still receives it.
    //
    // internally locks the queue. panics if already resolved or cancelled.
    pub(crate) fn poll(&mut self, cx: &mut Context) -> Poll<Result<T, CancelledError>> {
        let waiter = match replace(&mut self.state, TakeState::Terminated) {
            TakeState::Terminated => panic!("take future polled after already resolved or cancelled"),
            TakeState::Unpolled => {
                if self.queue.is_shutdown() {
                    return Poll::Ready(Err(CancelledError));
                }
                let mut lock = self.queue.lock();
                lock.check_shutdown()?;
                if let Some(elem) = lock.lock.poll_elem() {
                    return Poll::Ready(Ok(elem));
                }
                // nothing buffered, so register as a waiting consumer
                let waiter = lock.lock.takers.push();
                lock.lock.complete_takers();
                trace!("queue empty, suspending consumer");
                let poll = lock.lock.takers.poll(waiter, cx);
                if poll.is_pending() {
                    self.state = TakeState::Suspended(waiter);
                }
                return poll;
            }
            TakeState::Suspended(waiter) => waiter,
        };

        let poll = lock(&self.queue.0).takers.poll(waiter, cx);
        if poll.is_pending() {
            self.state = TakeState::Suspended(waiter);
        }
        poll
    }

    // if not already resolved or cancelled, cancel the future. if an element had already been
    // handed to this consumer, it is returned rather than lost.
    //
    // internally locks the queue if suspended. never panics. guaranteed that all wakers
    // previously cloned when polling are dropped by the time `cancel` returns.
    pub(crate) fn cancel(&mut self) -> Option<T> {
        let TakeState::Suspended(waiter) = replace(&mut self.state, TakeState::Terminated)
        else { return None };
        match lock(&self.queue.0).takers.remove(waiter) {
            Some(WaiterState::Completed(elem)) => Some(elem),
            _ => None,
        }
    }

    // like cancel, but an element already handed to this consumer is given back to the queue.
    pub(crate) fn abort(&mut self) {
        let TakeState::Suspended(waiter) = replace(&mut self.state, TakeState::Terminated)
        else { return };
        let mut lock = lock(&self.queue.0);
        if let Some(WaiterState::Completed(elem)) = lock.takers.remove(waiter) {
            if self.queue.is_shutdown() {
                debug!("queue shut down, dropping element returned by abandoned take");
            } else {
                lock.reinstate(elem);
            }
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self.state, TakeState::Terminated)
    }
}


// shutdown future. resolves once the queue has been shut down.
pub(crate) struct AwaitShutdown<T> {
    queue: Queue<T>,
    state: TakeState,
}

impl<T> AwaitShutdown<T> {
    // poll the future. internally locks the queue unless already shut down. panics if already
    // resolved or cancelled.
    pub(crate) fn poll(&mut self, cx: &mut Context) -> Poll<()> {
        let waiter = match replace(&mut self.state, TakeState::Terminated) {
            TakeState::Terminated => panic!("shutdown future polled after already resolved or cancelled"),
            TakeState::Unpolled => {
                if self.queue.is_shutdown() {
                    return Poll::Ready(());
                }
                let mut lock = self.queue.lock();
                if lock.check_shutdown().is_err() {
                    return Poll::Ready(());
                }
                lock.lock.shutdown_waiters.push()
            }
            TakeState::Suspended(waiter) => waiter,
        };

        // shutdown waiters are only ever completed, never cancelled, but either way the queue is
        // shut down
        let poll = lock(&self.queue.0).shutdown_waiters.poll(waiter, cx).map(|_| ());
        if poll.is_pending() {
            self.state = TakeState::Suspended(waiter);
        }
        poll
    }

    // if not already resolved or cancelled, cancel the future.
    //
    // internally locks the queue if suspended. never panics. guaranteed that all wakers
    // previously cloned when polling are dropped by the time `cancel` returns.
    pub(crate) fn cancel(&mut self) {
        if let TakeState::Suspended(waiter) = replace(&mut self.state, TakeState::Terminated) {
            lock(&self.queue.0).shutdown_waiters.remove(waiter);
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self.state, TakeState::Terminated)
    }
}

// safety for the DropWakers impls below: the only wakers these futures ever clone are the ones
// stored in their waiter node. a node's waker is taken on completion or cancellation, and the
// node itself, waker included, is dropped when poll observes the outcome or cancel removes it.
// all of that happens under the queue lock, and waking also happens under the queue lock, so no
// clone can still be in use once poll returns ready or cancel returns.

impl<T> Future for Offer<T> {
    type Output = Result<bool, CancelledError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        Offer::poll(self.get_mut(), cx)
    }
}

unsafe impl<T> DropWakers for Offer<T> {
    type Abandoned = Withdrawal<T>;

    fn drop_wakers(&mut self) -> Withdrawal<T> {
        self.cancel()
    }
}

impl<T> Future for Take<T> {
    type Output = Result<T, CancelledError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        Take::poll(self.get_mut(), cx)
    }
}

unsafe impl<T> DropWakers for Take<T> {
    type Abandoned = Option<T>;

    fn drop_wakers(&mut self) -> Option<T> {
        self.cancel()
    }
}

impl<T> Future for AwaitShutdown<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
        AwaitShutdown::poll(self.get_mut(), cx)
    }
}

unsafe impl<T> DropWakers for AwaitShutdown<T> {
    type Abandoned = ();

    fn drop_wakers(&mut self) {
        self.cancel()
    }
}
