// blocking the current thread on a queue future.
//
// the waker handed to the future points at a parker living on this function's stack frame rather
// than at a heap allocation. that is only sound because every future passed in promises, via
// DropWakers, to have gotten rid of every clone of the waker before we return.

use std::{
    future::Future,
    pin::Pin,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, RawWaker, RawWakerVTable, Waker},
    time::Instant,
};


// a future which can be made to drop every waker it has cloned.
//
// implementors guarantee:
//
// - if poll returns ready or panics, every waker it previously cloned has been dropped by the
//   time it returns.
// - if drop_wakers returns or panics, every waker previously cloned by poll has been dropped by
//   the time it does so.
//
// violating either is undefined behavior in block_on. drop_wakers is only called on a future that
// has not resolved, and the future is never polled again afterwards. a future may misbehave if
// that is violated, but must stay sound.
pub(crate) unsafe trait DropWakers: Future {
    // whatever the future hands back when abandoned.
    type Abandoned;

    fn drop_wakers(&mut self) -> Self::Abandoned;
}

// how long block_on may block for.
#[derive(Debug, Copy, Clone)]
pub(crate) enum Deadline {
    // until the future resolves.
    Never,
    // until the future resolves or the instant passes.
    At(Instant),
    // not at all. the future gets polled exactly once.
    Immediate,
}

// poll the future on the current thread until it resolves, or give up at the deadline and
// abandon it.
pub(crate) fn block_on<F>(fut: &mut F, deadline: Deadline) -> Result<F::Output, F::Abandoned>
where
    F: DropWakers + Unpin,
{
    let parker = Parker {
        state: Mutex::new(ParkState::Idle),
        cvar: Condvar::new(),
    };
    // safety: the waker borrows parker. if run returns ready, the future already dropped every
    //         clone. if it doesn't, drop_wakers makes the future drop them. if either panics,
    //         DropWakers still guarantees the clones are gone before the panic unwinds past here.
    let waker = unsafe { Waker::from_raw(raw_waker(&parker as *const Parker as *const ())) };
    let resolved = run(fut, &parker, &waker, deadline);
    drop(waker);
    let result = resolved.ok_or_else(|| fut.drop_wakers());
    // no pointer to parker remains past this point
    drop(parker);
    result
}

// poll-then-park loop.
fn run<F>(fut: &mut F, parker: &Parker, waker: &Waker, deadline: Deadline) -> Option<F::Output>
where
    F: Future + Unpin,
{
    let mut cx = Context::from_waker(waker);
    loop {
        if let Poll::Ready(output) = Pin::new(&mut *fut).poll(&mut cx) {
            return Some(output);
        }

        let mut state = parker.lock();
        // woken during the poll, so poll again straight away
        if let ParkState::Unparked = *state {
            *state = ParkState::Idle;
            continue;
        }
        match deadline {
            Deadline::Immediate => return None,
            Deadline::Never => {
                *state = ParkState::Parked;
                while let ParkState::Parked = *state {
                    state = parker.cvar.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
            }
            Deadline::At(at) => {
                *state = ParkState::Parked;
                while let ParkState::Parked = *state {
                    let Some(remaining) = at.checked_duration_since(Instant::now())
                    else { return None };
                    let (relocked, result) = parker.cvar.wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = relocked;
                    if result.timed_out() && matches!(*state, ParkState::Parked) {
                        return None;
                    }
                }
            }
        }
        *state = ParkState::Idle;
    }
}

enum ParkState {
    // running, no wakeup pending.
    Idle,
    // blocked on the condvar.
    Parked,
    // woken while not parked.
    Unparked,
}

struct Parker {
    state: Mutex<ParkState>,
    cvar: Condvar,
}

impl Parker {
    fn lock(&self) -> MutexGuard<'_, ParkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unpark(&self) {
        let mut state = self.lock();
        match *state {
            ParkState::Idle => *state = ParkState::Unparked,
            ParkState::Parked => {
                *state = ParkState::Idle;
                self.cvar.notify_one();
            }
            ParkState::Unparked => (),
        }
    }
}


// ==== waker vtable ====


static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_raw, drop_raw);

fn raw_waker(data: *const ()) -> RawWaker {
    RawWaker::new(data, &VTABLE)
}

unsafe fn clone_raw(data: *const ()) -> RawWaker {
    raw_waker(data)
}

unsafe fn wake_raw(data: *const ()) {
    // safety: block_on keeps the parker alive for as long as any waker pointing at it exists
    let parker = unsafe { &*(data as *const Parker) };
    parker.unpark();
}

unsafe fn drop_raw(_: *const ()) {}
