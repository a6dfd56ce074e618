// waiter part of a queue: suspended consumers, suspended producers, and shutdown observers.
//
// each waiter is a single-assignment slot that the queue completes or cancels exactly once, plus
// the waker of whichever task is suspended on it. waiters are linked into a doubly linked queue
// so that they can be served in registration order, yet removed from the middle in O(1) when the
// suspended operation is abandoned.
//
// rather than heap-allocating nodes and linking them with raw pointers, nodes live in a slot
// arena and link to each other by index. keys carry the slot's generation, which is bumped every
// time a slot is vacated, so a key from a previous occupant never aliases a new one.

use super::error::CancelledError;
use std::task::{Context, Poll, Waker};


// identity of a registered waiter. valid until the waiter's owner observes its completion or
// removes it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) struct WaiterKey {
    idx: usize,
    generation: u64,
}

// state of a waiter.
#[derive(Debug, PartialEq)]
pub(crate) enum WaiterState<V> {
    // still linked, nothing has happened yet.
    Pending,
    // completed with a value, not yet observed by the owner.
    Completed(V),
    // cancelled by the queue shutting down, not yet observed by the owner.
    Cancelled,
}

// arena-backed linked queue of waiters.
pub(crate) struct WaiterList<V> {
    slots: Vec<Slot<V>>,
    // indices of vacant slots, to reuse before growing.
    free: Vec<usize>,
    // front and back of the linked part, unless no waiter is pending.
    front_back: Option<(usize, usize)>,
    // number of pending (linked) waiters.
    len: usize,
}

struct Slot<V> {
    // bumped every time the slot is vacated.
    generation: u64,
    node: Option<Node<V>>,
}

// invariant: a node is linked if and only if its state is pending. once settled, a node stays
// allocated but unlinked until its owner takes it out.
struct Node<V> {
    // next node towards back.
    to_back: Option<usize>,
    // next node towards front.
    to_front: Option<usize>,
    // waker of the task suspended on this waiter, if it has been polled.
    waker: Option<Waker>,
    state: WaiterState<V>,
}

impl<V> WaiterList<V> {
    // construct empty.
    pub(crate) fn new() -> Self {
        WaiterList {
            slots: Vec::new(),
            free: Vec::new(),
            front_back: None,
            len: 0,
        }
    }

    // number of pending waiters.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    // register a new pending waiter at the back of the queue.
    pub(crate) fn push(&mut self) -> WaiterKey {
        let node = Node {
            to_back: None,
            to_front: self.front_back.map(|(_, back)| back),
            waker: None,
            state: WaiterState::Pending,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                debug_assert!(self.slots[idx].node.is_none());
                self.slots[idx].node = Some(node);
                idx
            }
            None => {
                self.slots.push(Slot { generation: 0, node: Some(node) });
                self.slots.len() - 1
            }
        };
        match self.front_back {
            Some((front, back)) => {
                // node becomes new back, and new to_back of previous back
                self.node_mut(back).to_back = Some(idx);
                self.front_back = Some((front, idx));
            }
            // edge case: node becomes only node in queue
            None => self.front_back = Some((idx, idx)),
        }
        self.len += 1;
        WaiterKey { idx, generation: self.slots[idx].generation }
    }

    // complete the waiter at the front of the queue with a value, or give the value back if no
    // waiter is pending.
    pub(crate) fn complete_front(&mut self, value: V) -> Result<(), V> {
        match self.front_back {
            Some((front, _)) => {
                self.settle(front, WaiterState::Completed(value));
                Ok(())
            }
            None => Err(value),
        }
    }

    // complete a specific waiter with a value, or give the value back if that waiter is no
    // longer pending.
    pub(crate) fn complete(&mut self, key: WaiterKey, value: V) -> Result<(), V> {
        if !self.node(key).is_some_and(|node| matches!(node.state, WaiterState::Pending)) {
            return Err(value);
        }
        self.settle(key.idx, WaiterState::Completed(value));
        Ok(())
    }

    // cancel every pending waiter, in order.
    pub(crate) fn cancel_all(&mut self) {
        while let Some((front, _)) = self.front_back {
            self.settle(front, WaiterState::Cancelled);
        }
    }

    // complete every pending waiter with a clone of the value, in order.
    pub(crate) fn complete_all(&mut self, value: V)
    where
        V: Clone,
    {
        while let Some((front, _)) = self.front_back {
            self.settle(front, WaiterState::Completed(value.clone()));
        }
    }

    // poll the waiter on behalf of its owner.
    //
    // - if still pending, installs the context's waker and returns pending.
    // - otherwise, vacates the slot and resolves to the outcome. the key is dead afterwards.
    //
    // panics if the key is dead.
    pub(crate) fn poll(&mut self, key: WaiterKey, cx: &mut Context) -> Poll<Result<V, CancelledError>> {
        let node = self.node_mut_checked(key)
            .expect("waiter polled after resolving or removal (internal bug)");
        if let WaiterState::Pending = node.state {
            if !node.waker.as_ref().is_some_and(|waker| waker.will_wake(cx.waker())) {
                node.waker = Some(cx.waker().clone());
            }
            return Poll::Pending;
        }
        match self.vacate(key.idx).state {
            WaiterState::Completed(value) => Poll::Ready(Ok(value)),
            WaiterState::Cancelled => Poll::Ready(Err(CancelledError)),
            WaiterState::Pending => unreachable!("vacated pending waiter (internal bug)"),
        }
    }

    // remove the waiter on behalf of its owner, unlinking it if still pending, and return the
    // state it was in. any waker it holds is dropped. returns none if the key is already dead.
    pub(crate) fn remove(&mut self, key: WaiterKey) -> Option<WaiterState<V>> {
        let pending = matches!(self.node(key)?.state, WaiterState::Pending);
        if pending {
            self.unlink(key.idx);
        }
        Some(self.vacate(key.idx).state)
    }

    // unlink a pending node, set its final state, and wake its task.
    fn settle(&mut self, idx: usize, state: WaiterState<V>) {
        assert!(
            matches!(self.node_mut(idx).state, WaiterState::Pending),
            "waiter settled twice (internal bug)",
        );
        self.unlink(idx);
        let node = self.node_mut(idx);
        node.state = state;
        if let Some(waker) = node.waker.take() {
            waker.wake();
        }
    }

    // unlink a linked node from the queue.
    fn unlink(&mut self, idx: usize) {
        let node = self.node_mut(idx);
        let to_front = node.to_front.take();
        let to_back = node.to_back.take();
        if let Some(to_front) = to_front {
            // node's to_back becomes new to_back of node's to_front
            self.node_mut(to_front).to_back = to_back;
        }
        if let Some(to_back) = to_back {
            // node's to_front becomes new to_front of node's to_back
            self.node_mut(to_back).to_front = to_front;
        }
        if let Some((front, back)) = self.front_back {
            let front = if front == idx { to_back } else { Some(front) };
            let back = if back == idx { to_front } else { Some(back) };
            self.front_back = front.zip(back);
        }
        self.len -= 1;
    }

    // take the node out of its slot and make the slot reusable.
    fn vacate(&mut self, idx: usize) -> Node<V> {
        let slot = &mut self.slots[idx];
        let node = slot.node.take().expect("vacated empty waiter slot (internal bug)");
        slot.generation += 1;
        self.free.push(idx);
        node
    }

    fn node(&self, key: WaiterKey) -> Option<&Node<V>> {
        self.slots.get(key.idx)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut_checked(&mut self, key: WaiterKey) -> Option<&mut Node<V>> {
        self.slots.get_mut(key.idx)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<V> {
        self.slots[idx].node.as_mut().expect("dangling waiter link (internal bug)")
    }
}
