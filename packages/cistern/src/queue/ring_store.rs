// ring store part of a queue: storage for buffered elements.

use std::{
    collections::VecDeque,
    mem::MaybeUninit,
};


// FIFO store of elements, either bounded or growable. not itself concurrent: the queue only
// touches it while holding its lock.
pub(crate) enum RingStore<T> {
    Bounded(Ring<T>),
    Unbounded(VecDeque<T>),
}

// fixed-capacity circular buffer.
//
// memory layout:
//
// - a "logical index" exists if it's in [0, len)
// - a logical index i maps to the slot (start + i) % capacity
// - slots are assumed to be initialized iff a logical index maps to them
pub(crate) struct Ring<T> {
    slots: Box<[MaybeUninit<T>]>,
    // invariant: start < capacity, unless capacity is 0, in which case start is 0
    start: usize,
    len: usize,
}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        Ring {
            slots: Box::new_uninit_slice(capacity),
            start: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    // convert from logical index to slot index. must not be called with capacity 0.
    fn slot_idx(&self, idx: usize) -> usize {
        debug_assert!(idx < self.capacity(), "ring index out of bounds (internal bug)");
        (self.start + idx) % self.capacity()
    }

    fn push_back(&mut self, elem: T) -> Result<(), T> {
        if self.is_full() {
            return Err(elem);
        }
        let idx = self.slot_idx(self.len);
        self.slots[idx].write(elem);
        self.len += 1;
        Ok(())
    }

    fn push_front(&mut self, elem: T) -> Result<(), T> {
        if self.is_full() {
            return Err(elem);
        }
        // step start back by one, wrapping around
        self.start = (self.start + self.capacity() - 1) % self.capacity();
        self.slots[self.start].write(elem);
        self.len += 1;
        Ok(())
    }

    fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        // safety: logical index 0 maps to slot start, which is therefore initialized. advancing
        //         start right after marks it as uninitialized again.
        let elem = unsafe { self.slots[self.start].assume_init_read() };
        self.start = (self.start + 1) % self.capacity();
        self.len -= 1;
        Some(elem)
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        // drop initialized elements
        for i in 0..self.len {
            let idx = self.slot_idx(i);
            // safety: idx is mapped to by a logical index
            unsafe { self.slots[idx].assume_init_drop(); }
        }
    }
}

impl<T> RingStore<T> {
    // construct empty with room for exactly `capacity` elements. capacity may be 0, in which case
    // the store is permanently full.
    pub(crate) fn bounded(capacity: usize) -> Self {
        RingStore::Bounded(Ring::new(capacity))
    }

    // construct empty and growable.
    pub(crate) fn unbounded() -> Self {
        RingStore::Unbounded(VecDeque::new())
    }

    // maximum number of elements, or none if unbounded.
    pub(crate) fn capacity(&self) -> Option<usize> {
        match self {
            RingStore::Bounded(ring) => Some(ring.capacity()),
            RingStore::Unbounded(_) => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            RingStore::Bounded(ring) => ring.len,
            RingStore::Unbounded(deque) => deque.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // whether offer would currently fail. never true for unbounded stores.
    pub(crate) fn is_full(&self) -> bool {
        match self {
            RingStore::Bounded(ring) => ring.is_full(),
            RingStore::Unbounded(_) => false,
        }
    }

    // push to back, or give the element back if full.
    pub(crate) fn offer(&mut self, elem: T) -> Result<(), T> {
        match self {
            RingStore::Bounded(ring) => ring.push_back(elem),
            RingStore::Unbounded(deque) => {
                deque.push_back(elem);
                Ok(())
            }
        }
    }

    // push to front, or give the element back if full. used to reinstate an element that was
    // removed from the front but never delivered.
    pub(crate) fn push_front(&mut self, elem: T) -> Result<(), T> {
        match self {
            RingStore::Bounded(ring) => ring.push_front(elem),
            RingStore::Unbounded(deque) => {
                deque.push_front(elem);
                Ok(())
            }
        }
    }

    // pop from front.
    pub(crate) fn poll(&mut self) -> Option<T> {
        match self {
            RingStore::Bounded(ring) => ring.pop_front(),
            RingStore::Unbounded(deque) => deque.pop_front(),
        }
    }

    // pop up to `max` elements from the front, in order.
    pub(crate) fn poll_up_to(&mut self, max: usize) -> Vec<T> {
        let n = max.min(self.len());
        let mut elems = Vec::with_capacity(n);
        while elems.len() < n {
            match self.poll() {
                Some(elem) => elems.push(elem),
                None => break,
            }
        }
        elems
    }

    // pop all elements, in order.
    pub(crate) fn poll_all(&mut self) -> Vec<T> {
        if let RingStore::Unbounded(deque) = self {
            return deque.drain(..).collect();
        }
        self.poll_up_to(usize::MAX)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_pcg::Pcg32;
    use std::{
        cell::Cell,
        rc::Rc,
    };

    fn new_rng() -> impl Rng {
        Pcg32::from_seed(0xdeadbeefdeadbeefdeadbeefdeadbeefu128.to_le_bytes())
    }

    // drive a store and a VecDeque model with the same random operations and compare them.
    fn equivalence_test(mut store: RingStore<u32>, bound: Option<usize>) {
        let mut rng = new_rng();
        let mut model = VecDeque::<u32>::new();

        for i in 0u32..20_000 {
            let roll = rng.gen_range(0..100);
            if roll < 50 {
                let result = store.offer(i);
                if bound.is_some_and(|n| model.len() >= n) {
                    assert_eq!(result, Err(i));
                } else {
                    assert_eq!(result, Ok(()));
                    model.push_back(i);
                }
            } else if roll < 55 {
                let result = store.push_front(i);
                if bound.is_some_and(|n| model.len() >= n) {
                    assert_eq!(result, Err(i));
                } else {
                    assert_eq!(result, Ok(()));
                    model.push_front(i);
                }
            } else if roll < 97 {
                assert_eq!(store.poll(), model.pop_front());
            } else {
                let max = rng.gen_range(0..8);
                let expect = model.drain(..max.min(model.len())).collect::<Vec<_>>();
                assert_eq!(store.poll_up_to(max), expect);
            }

            assert_eq!(store.len(), model.len());
            assert_eq!(store.is_empty(), model.is_empty());
            assert_eq!(store.is_full(), bound.is_some_and(|n| model.len() == n));
        }

        assert_eq!(store.poll_all(), model.drain(..).collect::<Vec<_>>());
        assert!(store.is_empty());
    }

    macro_rules! equivalence_bound_tests {
        ($($t:ident $n:expr,)*)=>{
            mod equivalence_bound_tests {
                use super::*;

                $(
                    #[test]
                    fn $t() {
                        equivalence_test(RingStore::bounded($n), Some($n));
                    }
                )*
            }
        };
    }

    equivalence_bound_tests!(
        _1 1,
        _2 2,
        _3 3,
        _7 7,
        _16 16,
        _100 100,
    );

    #[test]
    fn equivalence_unbounded() {
        equivalence_test(RingStore::unbounded(), None);
    }

    #[test]
    fn zero_capacity_is_always_full() {
        let mut store = RingStore::bounded(0);
        assert!(store.is_full());
        assert!(store.is_empty());
        assert_eq!(store.capacity(), Some(0));
        assert_eq!(store.offer(1), Err(1));
        assert_eq!(store.push_front(2), Err(2));
        assert_eq!(store.poll(), None);
        assert!(store.poll_all().is_empty());
    }

    #[test]
    fn bounded_wraps_around() {
        let mut store = RingStore::bounded(3);
        for round in 0..10 {
            assert_eq!(store.offer(round * 2), Ok(()));
            assert_eq!(store.offer(round * 2 + 1), Ok(()));
            assert_eq!(store.poll(), Some(round * 2));
            assert_eq!(store.poll(), Some(round * 2 + 1));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn drops_remaining_elements() {
        struct Counted(Rc<Cell<usize>>);

        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut store = RingStore::bounded(4);
        for _ in 0..4 {
            assert!(store.offer(Counted(Rc::clone(&drops))).is_ok());
        }
        drop(store.poll());
        assert_eq!(drops.get(), 1);
        assert!(store.offer(Counted(Rc::clone(&drops))).is_ok());
        drop(store);
        assert_eq!(drops.get(), 5);
    }
}
