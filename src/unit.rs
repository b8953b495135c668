//! Wrapping worker invocations as independent units of work.

use core::future::Future;
use core::pin::Pin;
use core::task::{ready, Context, Poll};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_lite::future::CatchUnwind;
use futures_lite::FutureExt;

use crate::error::{BoxError, Fault, UnitId};

/// The result of a work unit: the worker's value, or a captured failure.
pub type Outcome<T> = Result<T, Fault>;

/// A work unit that has run to completion.
#[derive(Debug)]
pub struct Finished<T> {
    /// Which unit finished.
    pub id: UnitId,
    /// What it produced.
    pub outcome: Outcome<T>,
}

/// Create the work units for one batch.
///
/// One unit is created per item. If `items` is empty a single unit is
/// created which calls the worker with `None`.
///
/// Units are lazy: the worker is not called until the unit is first polled.
/// Every unit resolves exactly once, to a [`Finished`] value; worker errors
/// and panics are captured into its outcome and never reach the caller.
///
/// # Examples
///
/// ```rust
/// use futures_interleave::unit::submit;
/// use futures_lite::future::block_on;
///
/// let units = submit(Vec::<u32>::new(), |n: Option<u32>| async move {
///     Ok::<_, std::io::Error>(n.unwrap_or(42))
/// });
/// assert_eq!(units.len(), 1);
///
/// let finished = block_on(units.into_iter().next().unwrap());
/// assert_eq!(finished.outcome.unwrap(), 42);
/// ```
pub fn submit<I, W, Fut, T, E>(items: I, worker: W) -> Vec<WorkUnit<I::Item, W, Fut>>
where
    I: IntoIterator,
    W: Fn(Option<I::Item>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    submit_shared(items, Arc::new(worker))
}

/// Like [`submit`], for a worker that is already shared.
pub fn submit_shared<I, W, Fut, T, E>(items: I, worker: Arc<W>) -> Vec<WorkUnit<I::Item, W, Fut>>
where
    I: IntoIterator,
    W: Fn(Option<I::Item>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    let mut units: Vec<_> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| WorkUnit::new(UnitId(index), worker.clone(), Some(item)))
        .collect();

    if units.is_empty() {
        units.push(WorkUnit::new(UnitId(0), worker, None));
    }
    units
}

/// One pending invocation of a worker.
///
/// This `struct` is created by [`submit`]. See its documentation for more.
#[must_use = "work units do nothing unless polled"]
#[pin_project::pin_project]
pub struct WorkUnit<In, W, Fut> {
    id: UnitId,
    #[pin]
    invoke: CatchUnwind<AssertUnwindSafe<Invoke<In, W, Fut>>>,
}

impl<In, W, Fut> WorkUnit<In, W, Fut>
where
    W: Fn(Option<In>) -> Fut,
    Fut: Future,
{
    fn new(id: UnitId, worker: Arc<W>, input: Option<In>) -> Self {
        let invoke = Invoke::Pending { worker, input };
        Self {
            id,
            invoke: AssertUnwindSafe(invoke).catch_unwind(),
        }
    }
}

impl<In, W, Fut> WorkUnit<In, W, Fut> {
    /// The unit's submission index.
    pub fn id(&self) -> UnitId {
        self.id
    }
}

impl<In, W, Fut> fmt::Debug for WorkUnit<In, W, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkUnit").field("id", &self.id).finish()
    }
}

impl<In, W, Fut, T, E> Future for WorkUnit<In, W, Fut>
where
    W: Fn(Option<In>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    type Output = Finished<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let id = *this.id;
        let outcome = match ready!(this.invoke.poll(cx)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(Fault::Worker {
                unit: id,
                source: err.into(),
            }),
            Err(payload) => Err(Fault::from_panic(id, payload)),
        };
        Poll::Ready(Finished { id, outcome })
    }
}

/// Calls the worker on first poll, then polls the future it returned.
#[pin_project::pin_project(project = InvokeProj, project_replace = InvokeReplace)]
enum Invoke<In, W, Fut> {
    Pending {
        worker: Arc<W>,
        input: Option<In>,
    },
    Running {
        #[pin]
        fut: Fut,
    },
    Done,
}

impl<In, W, Fut> Future for Invoke<In, W, Fut>
where
    W: Fn(Option<In>) -> Fut,
    Fut: Future,
{
    type Output = Fut::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match self.as_mut().project() {
                InvokeProj::Pending { .. } => {
                    let InvokeReplace::Pending { worker, input } =
                        self.as_mut().project_replace(Invoke::Done)
                    else {
                        unreachable!("state was checked above");
                    };
                    let fut = (*worker)(input);
                    self.as_mut().project_replace(Invoke::Running { fut });
                }
                InvokeProj::Running { fut } => {
                    let out = ready!(fut.poll(cx));
                    self.as_mut().project_replace(Invoke::Done);
                    return Poll::Ready(out);
                }
                InvokeProj::Done => panic!("work unit polled after completion"),
            }
        }
    }
}
