// exposed API of queues

use self::future::*;
use super::{
    core,
    error::*,
    strategy::Strategy,
};
use smallvec::smallvec;
use std::fmt::{self, Debug, Formatter};


/// Handle to an asynchronous multi-producer, multi-consumer FIFO queue
///
/// Cloning a `Queue` creates another handle to the same queue. Elements are delivered to
/// consumers in the order they were offered, and suspended consumers are served in the order they
/// started waiting.
///
/// What happens when a producer offers to a full bounded queue is decided by the queue's
/// [`Strategy`]. Unbounded queues never fill up.
///
/// Once [`shutdown`](Self::shutdown) is called, the queue is permanently unusable: every pending
/// and future operation on it fails with [`CancelledError`].
pub struct Queue<T>(core::Queue<T>);

impl<T> Queue<T> {
    /// Create a bounded queue with the given overflow strategy
    ///
    /// A capacity of 0 is legal. With [`Strategy::BackPressure`] this creates a rendezvous queue,
    /// where every offer waits for a consumer to take the element directly.
    pub fn bounded(capacity: usize, strategy: Strategy) -> Self {
        Queue(core::Queue::new(Some(capacity), strategy))
    }

    /// Create an unbounded queue
    ///
    /// Offers to an unbounded queue always succeed immediately.
    pub fn unbounded() -> Self {
        // the strategy is never consulted, since the store never fills up
        Queue(core::Queue::new(None, Strategy::Dropping))
    }

    /// Create a bounded queue which evicts its oldest elements when full
    pub fn sliding(capacity: usize) -> Self {
        Self::bounded(capacity, Strategy::Sliding)
    }

    /// Create a bounded queue which discards newly offered elements when full
    pub fn dropping(capacity: usize) -> Self {
        Self::bounded(capacity, Strategy::Dropping)
    }

    /// Create a bounded queue which suspends producers when full
    pub fn back_pressure(capacity: usize) -> Self {
        Self::bounded(capacity, Strategy::BackPressure)
    }

    /// Create a future to offer an element to this queue
    ///
    /// See the API of [`OfferFut`], as it is not only a future, but also provides additional
    /// methods, including the API for blocking on an offer or trying to offer immediately.
    pub fn offer(&self, elem: T) -> OfferFut<T> {
        OfferFut(self.0.offer(smallvec![elem]))
    }

    /// Create a future to offer a batch of elements to this queue
    ///
    /// The batch is placed in order, as one operation: waiting consumers are served first, then
    /// the store is filled, and whatever does not fit is handed to the overflow strategy as a
    /// whole. Resolves to `true` if and only if no element of the batch was dropped.
    pub fn offer_all<I>(&self, elems: I) -> OfferFut<T>
    where
        I: IntoIterator<Item = T>,
    {
        OfferFut(self.0.offer(elems.into_iter().collect()))
    }

    /// Create a future to take the next element from this queue
    ///
    /// See the API of [`TakeFut`], as it is not only a future, but also provides additional
    /// methods, including the API for blocking on a take or trying to take immediately.
    pub fn take(&self) -> TakeFut<T> {
        TakeFut(self.0.take())
    }

    /// Take every buffered element without waiting
    ///
    /// Returns an empty vec if nothing is buffered.
    pub fn take_all(&self) -> Result<Vec<T>, CancelledError> {
        self.0.lock().take_all()
    }

    /// Take up to `max` buffered elements without waiting
    pub fn take_up_to(&self, max: usize) -> Result<Vec<T>, CancelledError> {
        self.0.lock().take_up_to(max)
    }

    /// Number of elements in the queue
    ///
    /// This counts buffered elements plus elements held back from producers suspended by
    /// backpressure. It is negative when consumers are waiting on an empty queue, in which case
    /// its magnitude is the number of waiting consumers.
    pub fn size(&self) -> Result<isize, CancelledError> {
        self.0.lock().size()
    }

    /// Maximum number of buffered elements, or `usize::MAX` if unbounded
    pub fn capacity(&self) -> usize {
        self.0.capacity().unwrap_or(usize::MAX)
    }

    /// The overflow strategy this queue was created with
    pub fn strategy(&self) -> Strategy {
        self.0.strategy()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutdown(&self) -> bool {
        self.0.is_shutdown()
    }

    /// Shut the queue down
    ///
    /// Every suspended consumer and producer is woken with [`CancelledError`], buffered elements
    /// are no longer reachable, and every further operation fails with [`CancelledError`]. Calling
    /// this more than once has no further effect.
    pub fn shutdown(&self) {
        if !self.0.is_shutdown() {
            self.0.lock().shutdown();
        }
    }

    /// Create a future which resolves once the queue has been shut down
    pub fn await_shutdown(&self) -> ShutdownFut<T> {
        ShutdownFut(self.0.await_shutdown())
    }
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Queue(self.0.clone())
    }
}

impl<T> Debug for Queue<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Queue")
            .field("capacity", &self.capacity())
            .field("strategy", &self.strategy())
            .field("is_shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}


// future types for queues.
pub(crate) mod future {
    use super::*;
    use crate::queue::{
        polling::{block_on, Deadline},
        strategy::Withdrawal,
    };
    use std::{
        future::Future,
        pin::Pin,
        task::{Context, Poll},
        time::{Duration, Instant},
    };

    /// Future for offering to a [`Queue`]
    ///
    /// Nothing is placed into the queue until this future is first polled. If the queue is full
    /// and uses [`Strategy::BackPressure`], this future stays pending until every element of its
    /// batch has been placed, and the offer may be aborted in the meantime by calling
    /// [`rescind`](Self::rescind) (or by dropping), which hands back the elements not yet placed.
    ///
    /// Resolves to `Ok(false)` if the queue's strategy dropped an element, and to
    /// [`CancelledError`] if the queue is or becomes shut down.
    pub struct OfferFut<T>(pub(super) core::Offer<T>);

    impl<T> Future for OfferFut<T> {
        type Output = Result<bool, CancelledError>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            Pin::new(&mut this.0).poll(cx)
        }
    }

    impl<T> OfferFut<T> {
        /// Abort the offer and take back whichever elements have not been placed into the queue
        ///
        /// Elements of the batch which were already placed stay in the queue. Returns an empty vec
        /// if this future has already resolved or rescinded. This method never panics.
        pub fn rescind(&mut self) -> Vec<T> {
            match self.0.cancel() {
                Withdrawal::Unplaced(unplaced) => unplaced.into_vec(),
                Withdrawal::Settled(_) => Vec::new(),
            }
        }

        /// Try to resolve this future immediately without blocking
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it does return
        /// [`WouldBlockError`], the offer is rescinded. This method will panic if this future has
        /// already resolved or rescinded.
        pub fn try_now(&mut self) -> Result<bool, TryOfferError<T>> {
            assert!(!self.is_terminated(), "OfferFut.try_now called after terminated");
            map_try_offer_result(block_on(&mut self.0, Deadline::Immediate))
        }

        /// Block until this future resolves
        ///
        /// Calling this method counts as polling this future, and when this method returns, that
        /// counts as this future resolving. This method will panic if this future has already
        /// resolved or rescinded.
        pub fn block(&mut self) -> Result<bool, CancelledError> {
            assert!(!self.is_terminated(), "OfferFut.block called after terminated");
            match block_on(&mut self.0, Deadline::Never) {
                Ok(result) => result,
                Err(_) => unreachable!("blocking without deadline gave up"),
            }
        }

        /// Block until this future resolves or a timeout elapses
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it does return
        /// [`WouldBlockError`], the offer is rescinded. This method will panic if this future has
        /// already resolved or rescinded.
        pub fn block_timeout(&mut self, timeout: Duration) -> Result<bool, TryOfferError<T>> {
            assert!(!self.is_terminated(), "OfferFut.block_timeout called after terminated");
            self.block_deadline(Instant::now() + timeout)
        }

        /// Block until this future resolves or the deadline is reached
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it does return
        /// [`WouldBlockError`], the offer is rescinded. This method will panic if this future has
        /// already resolved or rescinded.
        pub fn block_deadline(&mut self, deadline: Instant) -> Result<bool, TryOfferError<T>> {
            assert!(!self.is_terminated(), "OfferFut.block_deadline called after terminated");
            map_try_offer_result(block_on(&mut self.0, Deadline::At(deadline)))
        }

        /// Whether this future has already resolved or rescinded
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
    }

    pub(super) fn map_try_offer_result<T>(
        result: Result<Result<bool, CancelledError>, Withdrawal<T>>,
    ) -> Result<bool, TryOfferError<T>> {
        match result {
            // released right as we gave up
            Ok(Ok(accepted)) | Err(Withdrawal::Settled(Ok(accepted))) => Ok(accepted),
            Ok(Err(CancelledError)) | Err(Withdrawal::Settled(Err(CancelledError))) => {
                Err(TryOfferError {
                    rescinded: Vec::new(),
                    cause: CancelledError.into(),
                })
            }
            Err(Withdrawal::Unplaced(unplaced)) => Err(TryOfferError {
                rescinded: unplaced.into_vec(),
                cause: WouldBlockError.into(),
            }),
        }
    }

    #[cfg(feature = "futures")]
    impl<T> futures::future::FusedFuture for OfferFut<T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }

    impl<T> Drop for OfferFut<T> {
        fn drop(&mut self) {
            // withdraw from backpressure if still suspended
            self.rescind();
        }
    }


    /// Future for taking from a [`Queue`]
    ///
    /// Nothing is taken from the queue until this future is first polled. If the queue is empty,
    /// this future waits in line behind every consumer which started waiting before it.
    ///
    /// If this future has not yet resolved, the take may be aborted by calling
    /// [`abort`](Self::abort) (or by dropping). If an element had already been handed to this
    /// future when it is aborted, the element is given back to the queue rather than lost.
    ///
    /// Resolves to [`CancelledError`] if the queue is or becomes shut down.
    pub struct TakeFut<T>(pub(super) core::Take<T>);

    impl<T> Future for TakeFut<T> {
        type Output = Result<T, CancelledError>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            Pin::new(&mut this.0).poll(cx)
        }
    }

    impl<T> TakeFut<T> {
        /// Try to abort this take operation
        ///
        /// This aborts the take, unless this future has already resolved or aborted, in which
        /// case this does nothing. This method never panics.
        pub fn abort(&mut self) {
            self.0.abort();
        }

        /// Try to resolve this future immediately without blocking
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it does return
        /// [`WouldBlockError`], the take is aborted. This method will panic if this future has
        /// already resolved or aborted.
        pub fn try_now(&mut self) -> Result<T, TryError> {
            assert!(!self.is_terminated(), "TakeFut.try_now called after terminated");
            map_try_take_result(block_on(&mut self.0, Deadline::Immediate))
        }

        /// Block until this future resolves
        ///
        /// Calling this method counts as polling this future, and when this method returns, that
        /// counts as this future resolving. This method will panic if this future has already
        /// resolved or aborted.
        pub fn block(&mut self) -> Result<T, CancelledError> {
            assert!(!self.is_terminated(), "TakeFut.block called after terminated");
            match block_on(&mut self.0, Deadline::Never) {
                Ok(result) => result,
                Err(_) => unreachable!("blocking without deadline gave up"),
            }
        }

        /// Block until this future resolves or a timeout elapses
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it does return
        /// [`WouldBlockError`], the take is aborted. This method will panic if this future has
        /// already resolved or aborted.
        pub fn block_timeout(&mut self, timeout: Duration) -> Result<T, TryError> {
            assert!(!self.is_terminated(), "TakeFut.block_timeout called after terminated");
            self.block_deadline(Instant::now() + timeout)
        }

        /// Block until this future resolves or the deadline is reached
        ///
        /// Calling this method counts as polling this future, and if this method returns anything
        /// other than [`WouldBlockError`], that counts as this future resolving. If it does return
        /// [`WouldBlockError`], the take is aborted. This method will panic if this future has
        /// already resolved or aborted.
        pub fn block_deadline(&mut self, deadline: Instant) -> Result<T, TryError> {
            assert!(!self.is_terminated(), "TakeFut.block_deadline called after terminated");
            map_try_take_result(block_on(&mut self.0, Deadline::At(deadline)))
        }

        /// Whether this future has already resolved or aborted
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
    }

    fn map_try_take_result<T>(
        result: Result<Result<T, CancelledError>, Option<T>>,
    ) -> Result<T, TryError> {
        match result {
            Ok(result) => result.map_err(TryError::from),
            // handed an element right as we gave up
            Err(Some(elem)) => Ok(elem),
            Err(None) => Err(WouldBlockError.into()),
        }
    }

    #[cfg(feature = "futures")]
    impl<T> futures::future::FusedFuture for TakeFut<T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }

    impl<T> Drop for TakeFut<T> {
        fn drop(&mut self) {
            // to make sure an element handed to us goes back to the queue
            self.abort();
        }
    }


    /// Future which resolves once a [`Queue`] has been shut down
    ///
    /// Resolves immediately if the queue already is shut down.
    pub struct ShutdownFut<T>(pub(super) core::AwaitShutdown<T>);

    impl<T> Future for ShutdownFut<T> {
        type Output = ();

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            Pin::new(&mut this.0).poll(cx)
        }
    }

    impl<T> ShutdownFut<T> {
        /// Whether the queue is already shut down, resolving this future if so
        ///
        /// This method will panic if this future has already resolved.
        pub fn try_now(&mut self) -> Result<(), WouldBlockError> {
            assert!(!self.is_terminated(), "ShutdownFut.try_now called after terminated");
            block_on(&mut self.0, Deadline::Immediate).map_err(|()| WouldBlockError)
        }

        /// Block until the queue is shut down
        ///
        /// This method will panic if this future has already resolved.
        pub fn block(&mut self) {
            assert!(!self.is_terminated(), "ShutdownFut.block called after terminated");
            if block_on(&mut self.0, Deadline::Never).is_err() {
                unreachable!("blocking without deadline gave up");
            }
        }

        /// Block until the queue is shut down or a timeout elapses
        ///
        /// This method will panic if this future has already resolved.
        pub fn block_timeout(&mut self, timeout: Duration) -> Result<(), WouldBlockError> {
            assert!(!self.is_terminated(), "ShutdownFut.block_timeout called after terminated");
            self.block_deadline(Instant::now() + timeout)
        }

        /// Block until the queue is shut down or the deadline is reached
        ///
        /// This method will panic if this future has already resolved.
        pub fn block_deadline(&mut self, deadline: Instant) -> Result<(), WouldBlockError> {
            assert!(!self.is_terminated(), "ShutdownFut.block_deadline called after terminated");
            block_on(&mut self.0, Deadline::At(deadline)).map_err(|()| WouldBlockError)
        }

        /// Whether this future has already resolved
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
    }

    #[cfg(feature = "futures")]
    impl<T> futures::future::FusedFuture for ShutdownFut<T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }

    impl<T> Drop for ShutdownFut<T> {
        fn drop(&mut self) {
            self.0.cancel();
        }
    }
}


// ==== tests ====


#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_pcg::Pcg32;
    use std::{
        collections::VecDeque,
        thread,
        time::Duration,
    };
    use tokio::{
        task::{self, yield_now},
        time::timeout,
    };

    // long enough for anything which can make progress to do so.
    const SETTLE: Duration = Duration::from_millis(20);

    async fn wait_for_size<T>(queue: &Queue<T>, size: isize) {
        while queue.size() != Ok(size) {
            yield_now().await;
        }
    }

    #[tokio::test]
    async fn fifo() {
        let queue = Queue::unbounded();
        for i in 0..100 {
            assert_eq!(queue.offer(i).await, Ok(true));
        }
        assert_eq!(queue.size(), Ok(100));
        for i in 0..100 {
            assert_eq!(queue.take().await, Ok(i));
        }
        assert_eq!(queue.size(), Ok(0));
    }

    #[test]
    fn fifo_stochastic() {
        let mut rng = Pcg32::from_seed(0xdeadbeefdeadbeefdeadbeefdeadbeefu128.to_le_bytes());
        let queue = Queue::unbounded();
        let mut model = VecDeque::new();
        for i in 0u32..10_000 {
            match rng.gen_range(0..10) {
                0..=4 => {
                    assert_eq!(queue.offer(i).try_now(), Ok(true));
                    model.push_back(i);
                }
                5..=7 => match model.pop_front() {
                    Some(expect) => assert_eq!(queue.take().try_now(), Ok(expect)),
                    None => assert_eq!(queue.take().try_now(), Err(TryError::WouldBlock(WouldBlockError))),
                },
                8 => {
                    let n = rng.gen_range(0..5);
                    let expect = model.drain(..n.min(model.len())).collect::<Vec<_>>();
                    assert_eq!(queue.take_up_to(n), Ok(expect));
                }
                _ => {
                    let batch = (0..rng.gen_range(0..4)).map(|j| i * 10 + j).collect::<Vec<_>>();
                    model.extend(batch.iter().copied());
                    assert_eq!(queue.offer_all(batch).try_now(), Ok(true));
                }
            }
            assert_eq!(queue.size(), Ok(model.len() as isize));
        }
        assert_eq!(queue.take_all(), Ok(Vec::from(model)));
    }

    #[tokio::test]
    async fn back_pressure_blocks_and_releases() {
        let queue = Queue::back_pressure(2);
        assert_eq!(queue.offer(1).await, Ok(true));
        assert_eq!(queue.offer(2).await, Ok(true));

        let mut blocked = queue.offer(3);
        assert!(timeout(SETTLE, &mut blocked).await.is_err());
        assert_eq!(queue.size(), Ok(3));

        assert_eq!(queue.take().await, Ok(1));
        assert_eq!(blocked.await, Ok(true));
        assert_eq!(queue.take_all(), Ok(vec![2, 3]));
    }

    #[tokio::test]
    async fn back_pressure_releases_producers_in_order() {
        let queue = Queue::back_pressure(1);
        assert_eq!(queue.offer(0).await, Ok(true));
        let mut first = queue.offer(1);
        let mut second = queue.offer(2);
        assert!(timeout(SETTLE, &mut first).await.is_err());
        assert!(timeout(SETTLE, &mut second).await.is_err());

        assert_eq!(queue.take().await, Ok(0));
        assert_eq!(first.await, Ok(true));
        assert!(timeout(SETTLE, &mut second).await.is_err());
        assert_eq!(queue.take().await, Ok(1));
        assert_eq!(second.await, Ok(true));
        assert_eq!(queue.take().await, Ok(2));
    }

    #[tokio::test]
    async fn dropping_loses_surplus() {
        let queue = Queue::dropping(2);
        assert_eq!(queue.offer(1).await, Ok(true));
        assert_eq!(queue.offer(2).await, Ok(true));
        assert_eq!(queue.offer(3).await, Ok(false));
        assert_eq!(queue.size(), Ok(2));
        assert_eq!(queue.take_all(), Ok(vec![1, 2]));
    }

    #[tokio::test]
    async fn dropping_batch_keeps_what_fits() {
        let queue = Queue::dropping(2);
        assert_eq!(queue.offer_all([1, 2, 3, 4]).await, Ok(false));
        assert_eq!(queue.take_all(), Ok(vec![1, 2]));
    }

    #[tokio::test]
    async fn sliding_evicts_oldest() {
        let queue = Queue::sliding(2);
        assert_eq!(queue.offer(1).await, Ok(true));
        assert_eq!(queue.offer(2).await, Ok(true));
        assert_eq!(queue.offer(3).await, Ok(true));
        assert_eq!(queue.take_all(), Ok(vec![2, 3]));
    }

    #[tokio::test]
    async fn shutdown_wakes_everyone() {
        let queue = Queue::<u32>::back_pressure(1);
        let taker = task::spawn(queue.take());
        wait_for_size(&queue, -1).await;

        queue.shutdown();
        assert_eq!(taker.await.unwrap(), Err(CancelledError));

        let queue = Queue::back_pressure(1);
        assert_eq!(queue.offer(1).await, Ok(true));
        let producer = task::spawn(queue.offer(2));
        let waiter = task::spawn(queue.await_shutdown());
        wait_for_size(&queue, 2).await;

        queue.shutdown();
        assert_eq!(producer.await.unwrap(), Err(CancelledError));
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let queue = Queue::sliding(4);
        assert_eq!(queue.offer(1).await, Ok(true));
        queue.shutdown();
        queue.shutdown();
        assert!(queue.is_shutdown());

        assert!(timeout(SETTLE, queue.await_shutdown()).await.is_ok());
        assert_eq!(queue.size(), Err(CancelledError));
        assert_eq!(queue.offer(2).await, Err(CancelledError));
        assert_eq!(queue.take().await, Err(CancelledError));
        assert_eq!(queue.take_all(), Err(CancelledError));
        assert_eq!(queue.take_up_to(1), Err(CancelledError));
    }

    #[tokio::test]
    async fn offer_all_completes_takers_in_order() {
        let queue = Queue::unbounded();
        let mut takers = Vec::new();
        for i in 1..=3 {
            takers.push(task::spawn(queue.take()));
            wait_for_size(&queue, -i).await;
        }

        assert_eq!(queue.offer_all(["a", "b", "c"]).await, Ok(true));
        let mut taken = Vec::new();
        for taker in takers {
            taken.push(taker.await.unwrap().unwrap());
        }
        assert_eq!(taken, vec!["a", "b", "c"]);
        assert_eq!(queue.size(), Ok(0));
    }

    #[tokio::test]
    async fn aborted_take_does_not_consume() {
        let queue = Queue::unbounded();
        let mut take = queue.take();
        assert!(timeout(SETTLE, &mut take).await.is_err());
        assert_eq!(queue.size(), Ok(-1));
        drop(take);
        assert_eq!(queue.size(), Ok(0));

        assert_eq!(queue.offer(7).await, Ok(true));
        assert_eq!(queue.take().await, Ok(7));
    }

    #[tokio::test]
    async fn dropped_take_gives_back_handed_element() {
        let queue = Queue::dropping(4);
        let mut take = queue.take();
        assert!(timeout(SETTLE, &mut take).await.is_err());
        assert_eq!(queue.offer_all([1, 2]).await, Ok(true));
        drop(take);
        assert_eq!(queue.take_all(), Ok(vec![1, 2]));
    }

    #[tokio::test]
    async fn dropped_take_on_full_queue_keeps_handed_element() {
        let queue = Queue::dropping(1);
        let mut take = queue.take();
        assert!(timeout(SETTLE, &mut take).await.is_err());
        assert_eq!(queue.offer(5).await, Ok(true));
        assert_eq!(queue.offer(6).await, Ok(true));
        drop(take);
        assert_eq!(queue.size(), Ok(2));
        assert_eq!(queue.take().await, Ok(5));
        assert_eq!(queue.take_all(), Ok(vec![6]));
    }

    #[tokio::test]
    async fn rescind_after_release_leaves_elements_placed() {
        let queue = Queue::back_pressure(1);
        assert_eq!(queue.offer(1).await, Ok(true));
        let mut blocked = queue.offer(2);
        assert!(timeout(SETTLE, &mut blocked).await.is_err());
        assert_eq!(queue.take().await, Ok(1));
        assert_eq!(blocked.rescind(), Vec::<i32>::new());
        assert_eq!(queue.take_all(), Ok(vec![2]));
    }

    #[test]
    fn giving_up_after_release_counts_as_accepted() {
        use crate::queue::strategy::Withdrawal;

        let settled = future::map_try_offer_result::<u8>(Err(Withdrawal::Settled(Ok(true))));
        assert!(matches!(settled, Ok(true)));

        let cancelled = future::map_try_offer_result::<u8>(
            Err(Withdrawal::Settled(Err(CancelledError))),
        );
        let err = cancelled.unwrap_err();
        assert_eq!(err.cause, TryError::Cancelled(CancelledError));
        assert!(err.rescinded.is_empty());

        let unplaced = future::map_try_offer_result::<u8>(
            Err(Withdrawal::Unplaced(smallvec![3])),
        );
        let err = unplaced.unwrap_err();
        assert_eq!(err.cause, TryError::WouldBlock(WouldBlockError));
        assert_eq!(err.rescinded, vec![3]);
    }

    #[tokio::test]
    async fn rescind_returns_unplaced_elements() {
        let queue = Queue::back_pressure(2);
        assert_eq!(queue.offer(1).await, Ok(true));
        let mut blocked = queue.offer_all([2, 3, 4]);
        assert!(timeout(SETTLE, &mut blocked).await.is_err());
        assert_eq!(queue.size(), Ok(4));

        assert_eq!(queue.take().await, Ok(1));
        assert_eq!(blocked.rescind(), vec![4]);
        assert!(blocked.is_terminated());
        assert_eq!(queue.take_all(), Ok(vec![2, 3]));
    }

    #[tokio::test]
    async fn zero_capacity_is_rendezvous() {
        let queue = Queue::back_pressure(0);
        let mut offer = queue.offer(1);
        assert!(timeout(SETTLE, &mut offer).await.is_err());
        assert_eq!(queue.size(), Ok(1));
        assert_eq!(queue.take().await, Ok(1));
        assert_eq!(offer.await, Ok(true));

        let taker = task::spawn(queue.take());
        wait_for_size(&queue, -1).await;
        assert_eq!(queue.offer(2).await, Ok(true));
        assert_eq!(taker.await.unwrap(), Ok(2));
    }

    #[tokio::test]
    async fn take_up_to_releases_back_pressure() {
        let queue = Queue::back_pressure(2);
        assert_eq!(queue.offer_all([1, 2]).await, Ok(true));
        let producer = task::spawn(queue.offer_all([3, 4]));
        wait_for_size(&queue, 4).await;

        assert_eq!(queue.take_up_to(1), Ok(vec![1]));
        assert_eq!(queue.take_up_to(5), Ok(vec![2, 3]));
        assert_eq!(producer.await.unwrap(), Ok(true));
        assert_eq!(queue.take_all(), Ok(vec![4]));
    }

    #[test]
    fn capacity_and_strategy() {
        let queue = Queue::<()>::bounded(3, Strategy::Sliding);
        assert_eq!(queue.capacity(), 3);
        assert_eq!(queue.strategy(), Strategy::Sliding);
        assert_eq!(Queue::<()>::unbounded().capacity(), usize::MAX);
        assert_eq!(Queue::<()>::back_pressure(0).capacity(), 0);
    }

    #[test]
    fn try_now_does_not_block() {
        let queue = Queue::back_pressure(1);
        assert_eq!(queue.take().try_now(), Err(TryError::WouldBlock(WouldBlockError)));
        assert_eq!(queue.offer(1).try_now(), Ok(true));

        let err = queue.offer_all([2, 3]).try_now().unwrap_err();
        assert_eq!(err.cause, TryError::WouldBlock(WouldBlockError));
        assert_eq!(err.rescinded, vec![2, 3]);
        assert_eq!(queue.size(), Ok(1));

        assert_eq!(queue.await_shutdown().try_now(), Err(WouldBlockError));
        queue.shutdown();
        assert_eq!(queue.await_shutdown().try_now(), Ok(()));
        assert_eq!(queue.take().try_now(), Err(TryError::Cancelled(CancelledError)));
    }

    #[test]
    fn block_timeout_elapses() {
        let queue = Queue::<u8>::unbounded();
        let result = queue.take().block_timeout(SETTLE);
        assert_eq!(result, Err(TryError::WouldBlock(WouldBlockError)));
        assert_eq!(queue.size(), Ok(0));
    }

    #[test]
    fn basic_1000_test() {
        let queue = Queue::back_pressure(500);

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 1..=1000 {
                    assert_eq!(queue.offer(i).block_timeout(Duration::from_secs(10)), Ok(true));
                    if i < 1000 && i % 100 == 0 {
                        thread::sleep(Duration::from_millis(50));
                    }
                }
            })
        };
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 1..=1000 {
                    assert_eq!(queue.take().block_timeout(Duration::from_secs(10)), Ok(i));
                }
                queue.shutdown();
            })
        };
        producer.join().unwrap();
        consumer.join().unwrap();
        queue.await_shutdown().block();
    }

    #[test]
    fn blocked_thread_woken_by_shutdown() {
        let queue = Queue::<u32>::unbounded();
        let taker = {
            let queue = queue.clone();
            thread::spawn(move || queue.take().block())
        };
        while queue.size() != Ok(-1) {
            thread::yield_now();
        }
        queue.shutdown();
        assert_eq!(taker.join().unwrap(), Err(CancelledError));
    }
}
