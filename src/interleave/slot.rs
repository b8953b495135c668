use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::unit::Finished;

/// Hands out slot indices in the order claims arrive.
///
/// One counter exists per batch. It only ever moves forward, from 0 to the
/// number of slots in the batch.
#[derive(Debug, Default)]
pub(crate) struct SlotCounter(AtomicUsize);

impl SlotCounter {
    /// Take the next unclaimed index.
    pub(crate) fn claim(&self) -> usize {
        // ORDERING: only the uniqueness of the index matters here. The value
        // itself is published through the slot's lock.
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn claimed(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

enum State<T> {
    Waiting(Option<Waker>),
    Filled(Finished<T>),
    Taken,
}

/// The completion slots of a single batch, plus the counter that assigns
/// them.
pub(crate) struct Slots<T> {
    counter: SlotCounter,
    cells: Box<[Mutex<State<T>>]>,
}

impl<T> Slots<T> {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            counter: SlotCounter::default(),
            cells: (0..len).map(|_| Mutex::new(State::Waiting(None))).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    fn cell(&self, index: usize) -> MutexGuard<'_, State<T>> {
        // A panic while holding a cell's lock can't leave the state
        // half-written, so a poisoned lock is safe to keep using.
        self.cells[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the next free slot and store `finished` in it.
    ///
    /// Returns the index that was claimed.
    pub(crate) fn claim_and_fill(&self, finished: Finished<T>) -> usize {
        let index = self.counter.claim();
        debug_assert!(index < self.len(), "more claims than slots");
        if index >= self.len() {
            return index;
        }

        let waker = {
            let mut cell = self.cell(index);
            match core::mem::replace(&mut *cell, State::Filled(finished)) {
                State::Waiting(waker) => waker,
                State::Filled(_) | State::Taken => unreachable!("slot {index} claimed twice"),
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        index
    }

    /// How many slots have been claimed so far.
    pub(crate) fn claimed(&self) -> usize {
        self.counter.claimed()
    }

    fn poll_take(&self, index: usize, cx: &mut Context<'_>) -> Poll<Finished<T>> {
        let mut cell = self.cell(index);
        match &mut *cell {
            State::Waiting(waker) => {
                match waker {
                    Some(w) if w.will_wake(cx.waker()) => {}
                    _ => *waker = Some(cx.waker().clone()),
                }
                Poll::Pending
            }
            State::Filled(_) => match core::mem::replace(&mut *cell, State::Taken) {
                State::Filled(finished) => Poll::Ready(finished),
                _ => unreachable!(),
            },
            State::Taken => panic!("completion slot {index} polled after it resolved"),
        }
    }
}

/// A future resolving to the work unit that finished in a given position.
///
/// Awaiting slot `i` yields the `i`-th unit of the batch to finish, whichever
/// unit that turns out to be.
#[must_use = "slots do nothing unless polled"]
pub struct Slot<T> {
    slots: Arc<Slots<T>>,
    index: usize,
}

impl<T> Slot<T> {
    pub(crate) fn new(slots: Arc<Slots<T>>, index: usize) -> Self {
        Self { slots, index }
    }

    /// The position of this slot in completion order.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("index", &self.index)
            .field("len", &self.slots.len())
            .finish()
    }
}

impl<T> Future for Slot<T> {
    type Output = Finished<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.slots.poll_take(self.index, cx)
    }
}
