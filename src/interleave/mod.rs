//! Turning a set of concurrently running units into a stream ordered by
//! completion.
//!
//! Every unit is paired with a [`Claim`]. When a unit finishes, its claim
//! bumps the batch's atomic slot counter and stores the finished unit in the
//! slot it was handed. Slot `0` therefore always holds the first unit to
//! finish, slot `1` the second, and so on, no matter in which order the units
//! were submitted.
//!
//! # Examples
//!
//! ```rust
//! use futures::channel::oneshot;
//! use futures_interleave::interleave::interleave;
//! use futures_interleave::unit::submit;
//! use futures_lite::future::{block_on, zip};
//! use futures_lite::StreamExt;
//!
//! block_on(async {
//!     let (tx_a, rx_a) = oneshot::channel::<&'static str>();
//!     let (tx_b, rx_b) = oneshot::channel::<&'static str>();
//!     let units = submit(vec![rx_a, rx_b], |rx: Option<oneshot::Receiver<&'static str>>| async move {
//!         rx.unwrap().await
//!     });
//!
//!     let (claims, mut completions) = interleave(units).into_parts();
//!     let drive = futures_buffered::join_all(claims);
//!     let consume = async move {
//!         tx_b.send("b").unwrap();
//!         let first = completions.next().await.unwrap();
//!         tx_a.send("a").unwrap();
//!         let second = completions.next().await.unwrap();
//!         (first.outcome.unwrap(), second.outcome.unwrap())
//!     };
//!
//!     let (_, order) = zip(drive, consume).await;
//!     assert_eq!(order, ("b", "a"));
//! });
//! ```

mod claim;
mod slot;

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use futures_core::Stream;

use crate::error::{SpawnError, UnitId};
use crate::spawn::Spawn;
use crate::unit::Finished;

pub use claim::Claim;
pub use slot::Slot;

use slot::Slots;

/// Pair every unit with a completion slot.
///
/// The returned [`Interleaved`] holds one [`Claim`] per unit, in submission
/// order, and as many [`Slot`]s, in completion order. Nothing runs until the
/// claims are spawned or polled.
///
/// A unit which is dropped before finishing is reported under its position in
/// `units`.
pub fn interleave<I, F, T>(units: I) -> Interleaved<F, T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Finished<T>>,
{
    let units: Vec<F> = units.into_iter().collect();
    let slots = Arc::new(Slots::new(units.len()));

    let claims = units
        .into_iter()
        .enumerate()
        .map(|(index, unit)| Claim::new(unit, UnitId(index), slots.clone()))
        .collect();

    Interleaved { claims, slots }
}

/// A batch of units paired with their completion slots.
///
/// This `struct` is created by [`interleave`]. See its documentation for
/// more.
#[must_use = "`Interleaved` does nothing until its claims are driven"]
pub struct Interleaved<F, T> {
    claims: Vec<Claim<F, T>>,
    slots: Arc<Slots<T>>,
}

impl<F, T> Interleaved<F, T> {
    /// The number of units, and slots, in the batch.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Split into the claims, to be driven by the caller, and the ordered
    /// completions.
    pub fn into_parts(self) -> (Vec<Claim<F, T>>, Completions<T>) {
        let completions = Completions::new(&self.slots);
        (self.claims, completions)
    }

    /// Spawn every claim on `pool` and return the ordered completions.
    ///
    /// If the pool refuses a claim, the claims spawned so far keep running
    /// and the error is returned.
    pub fn spawn<S>(self, pool: &S) -> Result<Completions<T>, SpawnError>
    where
        S: Spawn + ?Sized,
        F: Future<Output = Finished<T>> + Send + 'static,
        T: Send + 'static,
    {
        let completions = Completions::new(&self.slots);
        for claim in self.claims {
            pool.spawn(Box::pin(claim))?;
        }
        Ok(completions)
    }
}

impl<F, T> fmt::Debug for Interleaved<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interleaved")
            .field("len", &self.len())
            .field("claimed", &self.slots.claimed())
            .finish()
    }
}

/// The completion slots of a batch, yielded in index order.
///
/// Each item is the next unit to have finished. The stream ends after as many
/// items as there were units.
#[must_use = "streams do nothing unless polled"]
pub struct Completions<T> {
    pending: VecDeque<Slot<T>>,
}

impl<T> Completions<T> {
    fn new(slots: &Arc<Slots<T>>) -> Self {
        let pending = (0..slots.len())
            .map(|index| Slot::new(slots.clone(), index))
            .collect();
        Self { pending }
    }

    /// How many slots are still to be yielded.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Take the remaining slots, in index order.
    pub fn into_slots(self) -> Vec<Slot<T>> {
        self.pending.into()
    }
}

impl<T> fmt::Debug for Completions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completions")
            .field("remaining", &self.remaining())
            .finish()
    }
}

impl<T> Stream for Completions<T> {
    type Item = Finished<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(slot) = self.pending.front_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(slot).poll(cx) {
            Poll::Ready(finished) => {
                self.pending.pop_front();
                Poll::Ready(Some(finished))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pending.len(), Some(self.pending.len()))
    }
}
