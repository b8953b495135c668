//! Where work units run.
//!
//! Claims are either handed to a worker pool through the [`Spawn`] trait, or
//! driven inline on the consumer's own task. With the `tokio` feature enabled
//! a [`tokio::runtime::Handle`] is a pool.

use core::future::Future;
use core::pin::Pin;
use std::fmt;
use std::sync::Arc;

use crate::error::{DispatchError, SpawnError};

/// A detached task handed to a [`Spawn`] implementation.
pub type BoxTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A worker pool which can run detached tasks to completion.
///
/// Implementations must keep polling a task until it completes or the pool
/// itself shuts down. Tasks report their result through their completion
/// slot, so no join handle is needed.
pub trait Spawn {
    /// Run `task` in the background.
    fn spawn(&self, task: BoxTask) -> Result<(), SpawnError>;
}

impl<S> Spawn for &S
where
    S: Spawn + ?Sized,
{
    fn spawn(&self, task: BoxTask) -> Result<(), SpawnError> {
        (**self).spawn(task)
    }
}

impl<S> Spawn for Arc<S>
where
    S: Spawn + ?Sized,
{
    fn spawn(&self, task: BoxTask) -> Result<(), SpawnError> {
        (**self).spawn(task)
    }
}

#[cfg(feature = "tokio")]
impl Spawn for tokio::runtime::Handle {
    fn spawn(&self, task: BoxTask) -> Result<(), SpawnError> {
        // Detached: the task delivers its result through its slot.
        drop(tokio::runtime::Handle::spawn(self, task));
        Ok(())
    }
}

/// How the work units of a batch are run.
#[derive(Clone)]
#[non_exhaustive]
pub enum Execution {
    /// Drive every unit on the consumer's own task, concurrently with the
    /// consumer loop. Works with any executor, but never runs units in
    /// parallel.
    Inline,

    /// Spawn every unit on the tokio runtime the batch is started from.
    #[cfg(feature = "tokio")]
    Current,

    /// Spawn every unit on the given pool.
    Pool(Arc<dyn Spawn + Send + Sync>),
}

impl Execution {
    /// Spawn units on `pool`.
    pub fn pool<S>(pool: S) -> Self
    where
        S: Spawn + Send + Sync + 'static,
    {
        Execution::Pool(Arc::new(pool))
    }

    /// Resolve this strategy to a concrete pool, or `None` for inline
    /// execution.
    pub(crate) fn resolve(&self) -> Result<Option<Arc<dyn Spawn + Send + Sync>>, DispatchError> {
        match self {
            Execution::Inline => Ok(None),
            #[cfg(feature = "tokio")]
            Execution::Current => {
                let handle = tokio::runtime::Handle::try_current()?;
                Ok(Some(Arc::new(handle)))
            }
            Execution::Pool(pool) => Ok(Some(pool.clone())),
        }
    }
}

impl Default for Execution {
    #[cfg(feature = "tokio")]
    fn default() -> Self {
        Execution::Current
    }

    #[cfg(not(feature = "tokio"))]
    fn default() -> Self {
        Execution::Inline
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Execution::Inline => f.write_str("Inline"),
            #[cfg(feature = "tokio")]
            Execution::Current => f.write_str("Current"),
            Execution::Pool(_) => f.debug_tuple("Pool").field(&"..").finish(),
        }
    }
}
