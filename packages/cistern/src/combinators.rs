//! Derived queues which transform elements on their way in or out
//!
//! Every adapter here wraps another [`QueueLike`] and forwards the synchronization to it
//! untouched. Only the elements are changed. Transforms may be plain functions or effectful,
//! returning a future of an [`anyhow::Result`]. A failing transform resolves the operation to
//! [`QueueError::Transform`], while the underlying queue having been shut down resolves it to
//! [`QueueError::Cancelled`].
//!
//! ```
//! use cistern::{Queue, combinators::QueueLike};
//!
//! # futures::executor::block_on(async {
//! let queue = Queue::unbounded();
//! let lengths = queue.clone().contramap(|s: &'static str| s.len());
//! lengths.offer("hello").await.unwrap();
//! assert_eq!(queue.take().await, Ok(5));
//! # });
//! ```

use crate::{
    error::{CancelledError, QueueError},
    Queue,
};
use futures::{
    future::{self, BoxFuture},
    FutureExt,
    TryFutureExt,
};
use std::{
    future::Future,
    marker::PhantomData,
};


/// Operations shared by [`Queue`] and every queue derived from it
///
/// Producers offer `In`, consumers take `Out`.
pub trait QueueLike: Send + Sync {
    /// Element type offered by producers
    type In: Send;
    /// Element type taken by consumers
    type Out: Send;

    /// Offer an element. See [`Queue::offer`].
    fn offer(&self, elem: Self::In) -> BoxFuture<'_, Result<bool, QueueError>>;

    /// Offer a batch of elements. See [`Queue::offer_all`].
    fn offer_all(&self, elems: Vec<Self::In>) -> BoxFuture<'_, Result<bool, QueueError>>;

    /// Take the next element. See [`Queue::take`].
    fn take(&self) -> BoxFuture<'_, Result<Self::Out, QueueError>>;

    /// Take every buffered element. See [`Queue::take_all`].
    fn take_all(&self) -> BoxFuture<'_, Result<Vec<Self::Out>, QueueError>>;

    /// Take up to `max` buffered elements. See [`Queue::take_up_to`].
    fn take_up_to(&self, max: usize) -> BoxFuture<'_, Result<Vec<Self::Out>, QueueError>>;

    /// See [`Queue::size`].
    fn size(&self) -> Result<isize, CancelledError>;

    /// See [`Queue::capacity`].
    fn capacity(&self) -> usize;

    /// See [`Queue::is_shutdown`].
    fn is_shutdown(&self) -> bool;

    /// See [`Queue::shutdown`].
    fn shutdown(&self);

    /// See [`Queue::await_shutdown`].
    fn await_shutdown(&self) -> BoxFuture<'_, ()>;

    /// Transform elements as they are taken
    fn map<B, F>(self, f: F) -> Map<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Out) -> B + Send + Sync,
        B: Send,
    {
        Map { inner: self, f }
    }

    /// Transform elements as they are taken, with a fallible asynchronous function
    fn map_effect<B, F, Fut>(self, f: F) -> MapEffect<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Out) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<B>> + Send + 'static,
        B: Send,
    {
        MapEffect { inner: self, f }
    }

    /// Transform elements as they are offered
    fn contramap<C, F>(self, f: F) -> Contramap<Self, F, C>
    where
        Self: Sized,
        F: Fn(C) -> Self::In + Send + Sync,
        C: Send,
    {
        Contramap { inner: self, f, _in: PhantomData }
    }

    /// Transform elements as they are offered, with a fallible asynchronous function
    ///
    /// A batch is only offered once every element of it has been transformed.
    fn contramap_effect<C, F, Fut>(self, f: F) -> ContramapEffect<Self, F, C>
    where
        Self: Sized,
        F: Fn(C) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<Self::In>> + Send + 'static,
        C: Send,
    {
        ContramapEffect { inner: self, f, _in: PhantomData }
    }

    /// Only let through offered elements matching a predicate
    ///
    /// Offering a rejected element resolves to `Ok(false)` without touching the queue. Offering a
    /// batch offers the elements that pass, or resolves to `Ok(false)` if none do.
    fn filter_input<F>(self, f: F) -> FilterInput<Self, F>
    where
        Self: Sized,
        F: Fn(&Self::In) -> bool + Send + Sync,
    {
        FilterInput { inner: self, f }
    }

    /// Only let through offered elements matching a fallible asynchronous predicate
    ///
    /// The predicate receives a clone of each element.
    fn filter_input_effect<F, Fut>(self, f: F) -> FilterInputEffect<Self, F>
    where
        Self: Sized,
        Self::In: Clone,
        F: Fn(Self::In) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        FilterInputEffect { inner: self, f }
    }

    /// Transform elements both as they are offered and as they are taken
    fn bimap<C, B, F, G>(self, f: F, g: G) -> Map<Contramap<Self, F, C>, G>
    where
        Self: Sized,
        F: Fn(C) -> Self::In + Send + Sync,
        G: Fn(Self::Out) -> B + Send + Sync,
        C: Send,
        B: Send,
    {
        self.contramap(f).map(g)
    }

    /// Transform elements both as they are offered and as they are taken, with fallible
    /// asynchronous functions
    fn bimap_effect<C, B, F, FFut, G, GFut>(
        self,
        f: F,
        g: G,
    ) -> MapEffect<ContramapEffect<Self, F, C>, G>
    where
        Self: Sized,
        F: Fn(C) -> FFut + Send + Sync,
        FFut: Future<Output = anyhow::Result<Self::In>> + Send + 'static,
        G: Fn(Self::Out) -> GFut + Send + Sync,
        GFut: Future<Output = anyhow::Result<B>> + Send + 'static,
        C: Send,
        B: Send,
    {
        self.contramap_effect(f).map_effect(g)
    }

    /// Pair this queue with another one which accepts the same elements
    ///
    /// Offers go to both queues and succeed only if both accept. Takes take from both queues
    /// concurrently and combine the results with `f`. Draining operations pair elements up until
    /// either side runs out, so the longer side's excess is lost. Size is the larger of the two,
    /// capacity the smaller. Shutting down shuts down both, and the pair counts as shut down once
    /// either is.
    fn zip_with<R, F, D>(self, other: R, f: F) -> ZipWith<Self, R, F>
    where
        Self: Sized,
        Self::In: Clone,
        R: QueueLike<In = Self::In>,
        F: Fn(Self::Out, R::Out) -> D + Send + Sync,
        D: Send,
    {
        ZipWith { left: self, right: other, f }
    }
}

fn transform_error(e: anyhow::Error) -> QueueError {
    QueueError::Transform(e)
}

impl<T: Send> QueueLike for Queue<T> {
    type In = T;
    type Out = T;

    fn offer(&self, elem: T) -> BoxFuture<'_, Result<bool, QueueError>> {
        Queue::offer(self, elem).map_err(QueueError::from).boxed()
    }

    fn offer_all(&self, elems: Vec<T>) -> BoxFuture<'_, Result<bool, QueueError>> {
        Queue::offer_all(self, elems).map_err(QueueError::from).boxed()
    }

    fn take(&self) -> BoxFuture<'_, Result<T, QueueError>> {
        Queue::take(self).map_err(QueueError::from).boxed()
    }

    fn take_all(&self) -> BoxFuture<'_, Result<Vec<T>, QueueError>> {
        future::ready(Queue::take_all(self).map_err(QueueError::from)).boxed()
    }

    fn take_up_to(&self, max: usize) -> BoxFuture<'_, Result<Vec<T>, QueueError>> {
        future::ready(Queue::take_up_to(self, max).map_err(QueueError::from)).boxed()
    }

    fn size(&self) -> Result<isize, CancelledError> {
        Queue::size(self)
    }

    fn capacity(&self) -> usize {
        Queue::capacity(self)
    }

    fn is_shutdown(&self) -> bool {
        Queue::is_shutdown(self)
    }

    fn shutdown(&self) {
        Queue::shutdown(self)
    }

    fn await_shutdown(&self) -> BoxFuture<'_, ()> {
        Queue::await_shutdown(self).boxed()
    }
}


// ==== forwarding to the wrapped queue ====


macro_rules! forward_lifecycle {
    ()=>{
        fn size(&self) -> Result<isize, CancelledError> {
            self.inner.size()
        }

        fn capacity(&self) -> usize {
            self.inner.capacity()
        }

        fn is_shutdown(&self) -> bool {
            self.inner.is_shutdown()
        }

        fn shutdown(&self) {
            self.inner.shutdown()
        }

        fn await_shutdown(&self) -> BoxFuture<'_, ()> {
            self.inner.await_shutdown()
        }
    };
}

macro_rules! forward_input {
    ()=>{
        fn offer(&self, elem: Self::In) -> BoxFuture<'_, Result<bool, QueueError>> {
            self.inner.offer(elem)
        }

        fn offer_all(&self, elems: Vec<Self::In>) -> BoxFuture<'_, Result<bool, QueueError>> {
            self.inner.offer_all(elems)
        }
    };
}

macro_rules! forward_output {
    ()=>{
        fn take(&self) -> BoxFuture<'_, Result<Self::Out, QueueError>> {
            self.inner.take()
        }

        fn take_all(&self) -> BoxFuture<'_, Result<Vec<Self::Out>, QueueError>> {
            self.inner.take_all()
        }

        fn take_up_to(&self, max: usize) -> BoxFuture<'_, Result<Vec<Self::Out>, QueueError>> {
            self.inner.take_up_to(max)
        }
    };
}


// ==== adapters ====


/// Queue returned by [`QueueLike::map`]
pub struct Map<Q, F> {
    inner: Q,
    f: F,
}

impl<Q, F, B> QueueLike for Map<Q, F>
where
    Q: QueueLike,
    F: Fn(Q::Out) -> B + Send + Sync,
    B: Send,
{
    type In = Q::In;
    type Out = B;

    forward_input!();
    forward_lifecycle!();

    fn take(&self) -> BoxFuture<'_, Result<B, QueueError>> {
        self.inner.take().map_ok(&self.f).boxed()
    }

    fn take_all(&self) -> BoxFuture<'_, Result<Vec<B>, QueueError>> {
        self.inner.take_all()
            .map_ok(|elems| elems.into_iter().map(&self.f).collect())
            .boxed()
    }

    fn take_up_to(&self, max: usize) -> BoxFuture<'_, Result<Vec<B>, QueueError>> {
        self.inner.take_up_to(max)
            .map_ok(|elems| elems.into_iter().map(&self.f).collect())
            .boxed()
    }
}


/// Queue returned by [`QueueLike::map_effect`]
pub struct MapEffect<Q, F> {
    inner: Q,
    f: F,
}

impl<Q, F, Fut, B> MapEffect<Q, F>
where
    Q: QueueLike,
    F: Fn(Q::Out) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<B>> + Send + 'static,
    B: Send,
{
    // transform in order, stopping at the first failure.
    async fn map_all(&self, elems: Vec<Q::Out>) -> Result<Vec<B>, QueueError> {
        let mut mapped = Vec::with_capacity(elems.len());
        for elem in elems {
            mapped.push((self.f)(elem).await.map_err(transform_error)?);
        }
        Ok(mapped)
    }
}

impl<Q, F, Fut, B> QueueLike for MapEffect<Q, F>
where
    Q: QueueLike,
    F: Fn(Q::Out) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<B>> + Send + 'static,
    B: Send,
{
    type In = Q::In;
    type Out = B;

    forward_input!();
    forward_lifecycle!();

    fn take(&self) -> BoxFuture<'_, Result<B, QueueError>> {
        async move {
            let elem = self.inner.take().await?;
            (self.f)(elem).await.map_err(transform_error)
        }.boxed()
    }

    fn take_all(&self) -> BoxFuture<'_, Result<Vec<B>, QueueError>> {
        async move {
            let elems = self.inner.take_all().await?;
            self.map_all(elems).await
        }.boxed()
    }

    fn take_up_to(&self, max: usize) -> BoxFuture<'_, Result<Vec<B>, QueueError>> {
        async move {
            let elems = self.inner.take_up_to(max).await?;
            self.map_all(elems).await
        }.boxed()
    }
}


/// Queue returned by [`QueueLike::contramap`]
pub struct Contramap<Q, F, C> {
    inner: Q,
    f: F,
    _in: PhantomData<fn(C)>,
}

impl<Q, F, C> QueueLike for Contramap<Q, F, C>
where
    Q: QueueLike,
    F: Fn(C) -> Q::In + Send + Sync,
    C: Send,
{
    type In = C;
    type Out = Q::Out;

    forward_output!();
    forward_lifecycle!();

    fn offer(&self, elem: C) -> BoxFuture<'_, Result<bool, QueueError>> {
        self.inner.offer((self.f)(elem))
    }

    fn offer_all(&self, elems: Vec<C>) -> BoxFuture<'_, Result<bool, QueueError>> {
        self.inner.offer_all(elems.into_iter().map(&self.f).collect())
    }
}


/// Queue returned by [`QueueLike::contramap_effect`]
pub struct ContramapEffect<Q, F, C> {
    inner: Q,
    f: F,
    _in: PhantomData<fn(C)>,
}

impl<Q, F, Fut, C> QueueLike for ContramapEffect<Q, F, C>
where
    Q: QueueLike,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Q::In>> + Send + 'static,
    C: Send,
{
    type In = C;
    type Out = Q::Out;

    forward_output!();
    forward_lifecycle!();

    fn offer(&self, elem: C) -> BoxFuture<'_, Result<bool, QueueError>> {
        async move {
            let elem = (self.f)(elem).await.map_err(transform_error)?;
            self.inner.offer(elem).await
        }.boxed()
    }

    fn offer_all(&self, elems: Vec<C>) -> BoxFuture<'_, Result<bool, QueueError>> {
        async move {
            let mut mapped = Vec::with_capacity(elems.len());
            for elem in elems {
                mapped.push((self.f)(elem).await.map_err(transform_error)?);
            }
            self.inner.offer_all(mapped).await
        }.boxed()
    }
}


/// Queue returned by [`QueueLike::filter_input`]
pub struct FilterInput<Q, F> {
    inner: Q,
    f: F,
}

impl<Q, F> QueueLike for FilterInput<Q, F>
where
    Q: QueueLike,
    F: Fn(&Q::In) -> bool + Send + Sync,
{
    type In = Q::In;
    type Out = Q::Out;

    forward_output!();
    forward_lifecycle!();

    fn offer(&self, elem: Q::In) -> BoxFuture<'_, Result<bool, QueueError>> {
        if (self.f)(&elem) {
            self.inner.offer(elem)
        } else {
            future::ready(Ok(false)).boxed()
        }
    }

    fn offer_all(&self, elems: Vec<Q::In>) -> BoxFuture<'_, Result<bool, QueueError>> {
        let kept = elems.into_iter().filter(|elem| (self.f)(elem)).collect::<Vec<_>>();
        if kept.is_empty() {
            future::ready(Ok(false)).boxed()
        } else {
            self.inner.offer_all(kept)
        }
    }
}


/// Queue returned by [`QueueLike::filter_input_effect`]
pub struct FilterInputEffect<Q, F> {
    inner: Q,
    f: F,
}

impl<Q, F, Fut> QueueLike for FilterInputEffect<Q, F>
where
    Q: QueueLike,
    Q::In: Clone,
    F: Fn(Q::In) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    type In = Q::In;
    type Out = Q::Out;

    forward_output!();
    forward_lifecycle!();

    fn offer(&self, elem: Q::In) -> BoxFuture<'_, Result<bool, QueueError>> {
        async move {
            if !(self.f)(elem.clone()).await.map_err(transform_error)? {
                return Ok(false);
            }
            self.inner.offer(elem).await
        }.boxed()
    }

    fn offer_all(&self, elems: Vec<Q::In>) -> BoxFuture<'_, Result<bool, QueueError>> {
        async move {
            let mut kept = Vec::with_capacity(elems.len());
            for elem in elems {
                if (self.f)(elem.clone()).await.map_err(transform_error)? {
                    kept.push(elem);
                }
            }
            if kept.is_empty() {
                return Ok(false);
            }
            self.inner.offer_all(kept).await
        }.boxed()
    }
}


/// Queue returned by [`QueueLike::zip_with`]
pub struct ZipWith<L, R, F> {
    left: L,
    right: R,
    f: F,
}

impl<L, R, F, D> ZipWith<L, R, F>
where
    L: QueueLike,
    R: QueueLike<In = L::In>,
    F: Fn(L::Out, R::Out) -> D + Send + Sync,
{
    fn zip(&self, left: Vec<L::Out>, right: Vec<R::Out>) -> Vec<D> {
        left.into_iter().zip(right).map(|(l, r)| (self.f)(l, r)).collect()
    }
}

impl<L, R, F, D> QueueLike for ZipWith<L, R, F>
where
    L: QueueLike,
    L::In: Clone,
    R: QueueLike<In = L::In>,
    F: Fn(L::Out, R::Out) -> D + Send + Sync,
    D: Send,
{
    type In = L::In;
    type Out = D;

    fn offer(&self, elem: L::In) -> BoxFuture<'_, Result<bool, QueueError>> {
        future::try_join(self.left.offer(elem.clone()), self.right.offer(elem))
            .map_ok(|(l, r)| l && r)
            .boxed()
    }

    fn offer_all(&self, elems: Vec<L::In>) -> BoxFuture<'_, Result<bool, QueueError>> {
        future::try_join(self.left.offer_all(elems.clone()), self.right.offer_all(elems))
            .map_ok(|(l, r)| l && r)
            .boxed()
    }

    fn take(&self) -> BoxFuture<'_, Result<D, QueueError>> {
        future::try_join(self.left.take(), self.right.take())
            .map_ok(|(l, r)| (self.f)(l, r))
            .boxed()
    }

    fn take_all(&self) -> BoxFuture<'_, Result<Vec<D>, QueueError>> {
        future::try_join(self.left.take_all(), self.right.take_all())
            .map_ok(|(l, r)| self.zip(l, r))
            .boxed()
    }

    fn take_up_to(&self, max: usize) -> BoxFuture<'_, Result<Vec<D>, QueueError>> {
        future::try_join(self.left.take_up_to(max), self.right.take_up_to(max))
            .map_ok(|(l, r)| self.zip(l, r))
            .boxed()
    }

    fn size(&self) -> Result<isize, CancelledError> {
        Ok(self.left.size()?.max(self.right.size()?))
    }

    fn capacity(&self) -> usize {
        self.left.capacity().min(self.right.capacity())
    }

    fn is_shutdown(&self) -> bool {
        self.left.is_shutdown() || self.right.is_shutdown()
    }

    fn shutdown(&self) {
        self.left.shutdown();
        self.right.shutdown();
    }

    fn await_shutdown(&self) -> BoxFuture<'_, ()> {
        future::join(self.left.await_shutdown(), self.right.await_shutdown())
            .map(|((), ())| ())
            .boxed()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, bail};
    use std::time::Duration;
    use tokio::{
        task,
        time::timeout,
    };

    #[tokio::test]
    async fn map_transforms_taken_elements() {
        let queue = Queue::unbounded();
        let doubled = queue.clone().map(|x: u32| x * 2);
        assert!(doubled.offer_all(vec![1, 2, 3, 4]).await.unwrap());

        assert_eq!(doubled.take().await.unwrap(), 2);
        assert_eq!(doubled.take_up_to(2).await.unwrap(), vec![4, 6]);
        assert_eq!(doubled.take_all().await.unwrap(), vec![8]);
        assert_eq!(doubled.size(), Ok(0));
    }

    #[tokio::test]
    async fn map_effect_reports_transform_failure() {
        let queue = Queue::unbounded();
        let inverted = queue.clone().map_effect(|x: u32| async move {
            if x == 0 {
                bail!("cannot invert zero");
            }
            Ok(100 / x)
        });
        assert!(queue.offer_all([0, 4, 5]).await.unwrap());

        match inverted.take().await {
            Err(QueueError::Transform(e)) => assert_eq!(e.to_string(), "cannot invert zero"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(inverted.take_all().await.unwrap(), vec![25, 20]);
    }

    #[tokio::test]
    async fn contramap_transforms_offered_elements() {
        let queue = Queue::sliding(2);
        let lengths = queue.clone().contramap(|s: &'static str| s.len());
        assert!(lengths.offer("a").await.unwrap());
        assert!(lengths.offer_all(vec!["bb", "ccc"]).await.unwrap());
        assert_eq!(lengths.capacity(), 2);
        assert_eq!(queue.take_all(), Ok(vec![2, 3]));
    }

    #[tokio::test]
    async fn contramap_effect_offers_nothing_on_failure() {
        let queue = Queue::unbounded();
        let parsed = queue.clone().contramap_effect(|s: String| async move {
            s.parse::<i64>().map_err(|e| anyhow!("bad input {:?}: {}", s, e))
        });
        assert!(parsed.offer("7".to_owned()).await.unwrap());

        let result = parsed.offer_all(vec!["8".to_owned(), "nine".to_owned()]).await;
        assert!(matches!(result, Err(QueueError::Transform(_))));
        assert_eq!(queue.take_all(), Ok(vec![7]));
    }

    #[tokio::test]
    async fn filter_input_rejects_without_offering() {
        let queue = Queue::unbounded();
        let evens = queue.clone().filter_input(|x: &u32| x % 2 == 0);
        assert!(!evens.offer(3).await.unwrap());
        assert!(evens.offer(4).await.unwrap());
        assert!(!evens.offer_all(vec![1, 3, 5]).await.unwrap());
        assert!(evens.offer_all(vec![5, 6, 7, 8]).await.unwrap());
        assert_eq!(evens.take_all().await.unwrap(), vec![4, 6, 8]);
    }

    #[tokio::test]
    async fn filter_input_reports_dropped_elements() {
        let queue = Queue::dropping(1);
        let small = queue.clone().filter_input(|x: &u32| *x < 10);
        assert!(!small.offer_all(vec![1, 2, 30]).await.unwrap());
        assert_eq!(queue.take_all(), Ok(vec![1]));
    }

    #[tokio::test]
    async fn filter_input_effect() {
        let queue = Queue::unbounded();
        let checked = queue.clone().filter_input_effect(|x: i32| async move {
            if x < 0 {
                bail!("negative input");
            }
            Ok(x > 10)
        });
        assert!(!checked.offer(5).await.unwrap());
        assert!(checked.offer(50).await.unwrap());
        assert!(checked.offer_all(vec![1, 20, 30]).await.unwrap());
        assert!(matches!(checked.offer(-1).await, Err(QueueError::Transform(_))));
        assert_eq!(queue.take_all(), Ok(vec![50, 20, 30]));
    }

    #[tokio::test]
    async fn bimap_transforms_both_ends() {
        let queue = Queue::unbounded();
        let adapted = queue.clone().bimap(|x: u8| u32::from(x) * 1000, |x: u32| x.to_string());
        assert!(adapted.offer(3).await.unwrap());
        assert_eq!(queue.size(), Ok(1));
        assert_eq!(adapted.take().await.unwrap(), "3000");
    }

    #[tokio::test]
    async fn bimap_effect_transforms_both_ends() {
        let queue = Queue::unbounded();
        let adapted = queue.clone().bimap_effect(
            |x: u32| async move { x.checked_mul(2).ok_or_else(|| anyhow!("overflow")) },
            |x: u32| async move { Ok::<_, anyhow::Error>(x + 1) },
        );
        assert!(adapted.offer_all(vec![1, 2]).await.unwrap());
        assert!(matches!(adapted.offer(u32::MAX).await, Err(QueueError::Transform(_))));
        assert_eq!(adapted.take_all().await.unwrap(), vec![3, 5]);
    }

    #[tokio::test]
    async fn zip_with_pairs_two_queues() {
        let left = Queue::unbounded();
        let right = Queue::back_pressure(3);
        let zipped = left.clone().zip_with(right.clone(), |l: u32, r: u32| l * 10 + r);
        assert_eq!(zipped.capacity(), 3);

        assert!(zipped.offer_all(vec![1, 2]).await.unwrap());
        assert_eq!(zipped.take().await.unwrap(), 11);

        assert!(left.offer(3).await.unwrap());
        assert_eq!(zipped.size(), Ok(2));
        assert_eq!(zipped.take_all().await.unwrap(), vec![22]);
        assert_eq!(left.take_all(), Ok(vec![]));
    }

    #[tokio::test]
    async fn zip_with_takes_concurrently() {
        let left = Queue::unbounded();
        let right = Queue::unbounded();
        let zipped = left.clone().zip_with(right.clone(), |l: u32, r: u32| (l, r));

        let taker = task::spawn(async move { zipped.take().await });
        assert!(right.offer(2).await.unwrap());
        assert!(left.offer(1).await.unwrap());
        assert_eq!(taker.await.unwrap().unwrap(), (1, 2));
    }

    #[tokio::test]
    async fn zip_with_shuts_down_both() {
        let left = Queue::<u32>::unbounded();
        let right = Queue::<u32>::unbounded();
        let zipped = left.clone().zip_with(right.clone(), |l, r| l + r);

        right.shutdown();
        assert!(zipped.is_shutdown());
        assert!(timeout(Duration::from_millis(20), zipped.await_shutdown()).await.is_err());

        zipped.shutdown();
        assert!(left.is_shutdown());
        assert!(timeout(Duration::from_millis(20), zipped.await_shutdown()).await.is_ok());
    }

    #[tokio::test]
    async fn adapters_report_cancellation() {
        let queue = Queue::<u32>::unbounded();
        let mapped = queue.clone().map(|x| x + 1).contramap(|x: u32| x * 2);
        let taker = task::spawn(async move {
            let result = mapped.take().await;
            (result, mapped)
        });
        while queue.size() != Ok(-1) {
            task::yield_now().await;
        }

        queue.shutdown();
        let (result, mapped) = taker.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());
        assert!(mapped.is_shutdown());
        assert_eq!(mapped.size(), Err(CancelledError));
        assert!(mapped.offer(1).await.unwrap_err().is_cancelled());
        mapped.await_shutdown().await;
    }
}
