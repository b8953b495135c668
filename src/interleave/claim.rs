use core::future::Future;
use core::pin::Pin;
use core::task::{ready, Context, Poll};
use std::fmt;
use std::sync::Arc;

use pin_project::{pin_project, pinned_drop};

use super::slot::Slots;
use crate::error::{Fault, UnitId};
use crate::unit::Finished;

/// Runs one work unit and, once it finishes, files it into the next free
/// completion slot.
///
/// A claim which is dropped before its unit finished still takes a slot, and
/// fills it with [`Fault::Abandoned`], so the consumer never waits on a slot
/// that can't resolve.
///
/// This `struct` is created by [`interleave`][super::interleave].
#[must_use = "claims do nothing unless polled"]
#[pin_project(PinnedDrop)]
pub struct Claim<F, T> {
    #[pin]
    unit: F,
    id: UnitId,
    slots: Arc<Slots<T>>,
    claimed: bool,
}

impl<F, T> Claim<F, T> {
    pub(crate) fn new(unit: F, id: UnitId, slots: Arc<Slots<T>>) -> Self {
        Self {
            unit,
            id,
            slots,
            claimed: false,
        }
    }
}

impl<F, T> fmt::Debug for Claim<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claim")
            .field("id", &self.id)
            .field("claimed", &self.claimed)
            .finish()
    }
}

impl<F, T> Future for Claim<F, T>
where
    F: Future<Output = Finished<T>>,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        assert!(!*this.claimed, "claim polled after it completed");

        let finished = ready!(this.unit.poll(cx));
        *this.claimed = true;

        let unit = finished.id;
        let index = this.slots.claim_and_fill(finished);
        tracing::trace!(%unit, slot = index, "work unit claimed completion slot");
        Poll::Ready(())
    }
}

#[pinned_drop]
impl<F, T> PinnedDrop for Claim<F, T> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if *this.claimed {
            return;
        }
        let unit = *this.id;
        let index = this.slots.claim_and_fill(Finished {
            id: unit,
            outcome: Err(Fault::Abandoned { unit }),
        });
        tracing::warn!(%unit, slot = index, "work unit dropped before it finished");
    }
}
