//! Draining completion slots in order and handing results to the host.
//!
//! The consumer loop awaits slot `0`, then slot `1`, and so on. It never
//! looks ahead. Successful values go through a [`PostProcess`] step, which
//! emits them on the [`Host`]. Failures are reported one by one and never
//! stop the loop.

use core::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures_core::Stream;
use futures_lite::StreamExt;

use crate::error::{EmitError, ErrorReport, Fault};
use crate::unit::Finished;

/// The host's output and error channels.
pub trait Host {
    /// The record type the host accepts.
    type Record;

    /// Emit one record.
    ///
    /// Return [`EmitError::StopRequested`] once no further output is wanted.
    fn emit(&mut self, record: Self::Record) -> Result<(), EmitError>;

    /// Report a non-fatal, per-unit failure.
    fn report(&mut self, report: ErrorReport);
}

impl<H> Host for &mut H
where
    H: Host + ?Sized,
{
    type Record = H::Record;

    fn emit(&mut self, record: Self::Record) -> Result<(), EmitError> {
        (**self).emit(record)
    }

    fn report(&mut self, report: ErrorReport) {
        (**self).report(report)
    }
}

/// Turns one successful work unit value into host output.
///
/// Implemented for closures of the form `FnMut(T, &mut H) -> Result<(),
/// EmitError>`.
pub trait PostProcess<T, H>
where
    H: Host,
{
    /// Handle `value`, emitting whatever it produces on `host`.
    fn post_process(&mut self, value: T, host: &mut H) -> Result<(), EmitError>;
}

impl<T, H, F> PostProcess<T, H> for F
where
    H: Host,
    F: FnMut(T, &mut H) -> Result<(), EmitError>,
{
    fn post_process(&mut self, value: T, host: &mut H) -> Result<(), EmitError> {
        self(value, host)
    }
}

/// Emit each value as a single record.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmitValue;

impl<H> PostProcess<H::Record, H> for EmitValue
where
    H: Host,
{
    fn post_process(&mut self, value: H::Record, host: &mut H) -> Result<(), EmitError> {
        host.emit(value)
    }
}

/// Enumerate each value and emit its elements as separate records.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmitEach;

impl<I, H> PostProcess<I, H> for EmitEach
where
    H: Host,
    I: IntoIterator<Item = H::Record>,
{
    fn post_process(&mut self, value: I, host: &mut H) -> Result<(), EmitError> {
        value.into_iter().try_for_each(|record| host.emit(record))
    }
}

/// What happened while draining a batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Drained {
    /// Values handed to post-processing without error.
    pub emitted: usize,
    /// Faults passed to [`Host::report`].
    pub reported: usize,
    /// Values dropped because the host had asked to stop.
    pub discarded: usize,
    /// Whether the host asked to stop.
    pub stopped: bool,
}

impl Drained {
    /// The number of slots drained.
    pub fn total(&self) -> usize {
        self.emitted + self.reported + self.discarded + usize::from(self.stopped)
    }
}

/// Drain `completions` in order.
///
/// Each successful value is passed to `post`. Every fault, from a unit or
/// from post-processing, is reported on `host` under `source` and the loop
/// moves on to the next slot. A panic in post-processing is caught and
/// reported as [`Fault::Unclassified`].
///
/// Once post-processing returns [`EmitError::StopRequested`] the loop stops
/// emitting: later values are discarded. It still awaits every remaining slot,
/// and still reports faults from units that fail on their own.
pub async fn drain<S, T, P, H>(
    completions: S,
    post: &mut P,
    host: &mut H,
    source: &str,
) -> Drained
where
    S: Stream<Item = Finished<T>>,
    P: PostProcess<T, H>,
    H: Host,
{
    let mut completions = core::pin::pin!(completions);
    let mut drained = Drained::default();

    while let Some(Finished { id, outcome }) = completions.next().await {
        let fault = match outcome {
            Ok(_) if drained.stopped => {
                drained.discarded += 1;
                continue;
            }
            Ok(value) => {
                let emitted =
                    panic::catch_unwind(AssertUnwindSafe(|| post.post_process(value, host)));
                match emitted {
                    Ok(Ok(())) => {
                        drained.emitted += 1;
                        continue;
                    }
                    Ok(Err(EmitError::StopRequested)) => {
                        tracing::debug!(unit = %id, "host stopped accepting output");
                        drained.stopped = true;
                        continue;
                    }
                    Ok(Err(EmitError::Failed(cause))) => Fault::Unclassified {
                        unit: id,
                        source: cause,
                    },
                    Err(payload) => Fault::from_post_process_panic(id, payload),
                }
            }
            Err(fault) => fault,
        };

        tracing::debug!(unit = %id, kind = fault.error_id(), "reporting fault: {fault}");
        host.report(ErrorReport::new(fault, source));
        drained.reported += 1;
    }

    drained
}

/// Drain a plain list of slot futures, in the order given.
///
/// Equivalent to [`drain`] over a stream of the same futures.
pub async fn drain_slots<I, F, T, P, H>(
    slots: I,
    post: &mut P,
    host: &mut H,
    source: &str,
) -> Drained
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Finished<T>>,
    P: PostProcess<T, H>,
    H: Host,
{
    let completions = futures_lite::stream::iter(slots).then(|slot| slot);
    drain(completions, post, host, source).await
}
