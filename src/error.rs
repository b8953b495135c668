//! Failure types shared by the runner, the interleaver and the consumer loop.
//!
//! Per-unit failures are captured as a [`Fault`] and stay contained in the
//! slot that produced them. Only a [`DispatchError`] ever aborts a batch.

use core::fmt;
use std::any::Any;
use std::error::Error;

/// A type-erased error, as returned by workers and emission callbacks.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// The submission index of a work unit within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub(crate) usize);

impl UnitId {
    /// Position of the unit's input item in the submitted sequence.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A failure captured for a single work unit.
#[derive(Debug, thiserror::Error)]
pub enum Fault {
    /// The worker returned an error for this unit's input.
    #[error("work unit {unit} failed: {source}")]
    Worker {
        /// The failing unit.
        unit: UnitId,
        /// What the worker returned.
        source: BoxError,
    },

    /// The worker panicked while running this unit.
    #[error("work unit {unit} panicked: {message}")]
    Panicked {
        /// The failing unit.
        unit: UnitId,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The unit was dropped before it finished, e.g. because its runtime
    /// shut down.
    #[error("work unit {unit} was dropped before it finished")]
    Abandoned {
        /// The abandoned unit.
        unit: UnitId,
    },

    /// Post-processing of a successful value failed.
    #[error("post-processing of work unit {unit} failed: {source}")]
    Unclassified {
        /// The unit whose value was being post-processed.
        unit: UnitId,
        /// What the emission callback returned.
        source: BoxError,
    },
}

impl Fault {
    /// The unit this fault originated from.
    pub fn unit(&self) -> UnitId {
        match self {
            Fault::Worker { unit, .. }
            | Fault::Panicked { unit, .. }
            | Fault::Abandoned { unit }
            | Fault::Unclassified { unit, .. } => *unit,
        }
    }

    /// A short, stable identifier for the kind of fault.
    pub fn error_id(&self) -> &'static str {
        match self {
            Fault::Worker { .. } => "WorkerFault",
            Fault::Panicked { .. } => "WorkerPanic",
            Fault::Abandoned { .. } => "UnitAbandoned",
            Fault::Unclassified { .. } => "UnclassifiedFault",
        }
    }

    pub(crate) fn from_panic(unit: UnitId, payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(&*payload);
        Fault::Panicked { unit, message }
    }

    /// A panic raised while post-processing the value of `unit`.
    pub(crate) fn from_post_process_panic(unit: UnitId, payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(&*payload);
        Fault::Unclassified {
            unit,
            source: format!("panicked: {message}").into(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}

/// Returned by [`Host::emit`][crate::Host::emit] and by post-processing.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// The host no longer accepts output. This is not an error: the consumer
    /// loop swallows it and stops emitting for the rest of the batch.
    #[error("the output channel stopped accepting records")]
    StopRequested,

    /// Emission failed for some other reason.
    #[error(transparent)]
    Failed(BoxError),
}

impl EmitError {
    /// Wrap any error as an emission failure.
    pub fn failed<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        EmitError::Failed(err.into())
    }
}

/// The category a fault is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// No more specific category applies.
    NotSpecified,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::NotSpecified => f.write_str("NotSpecified"),
        }
    }
}

/// Identifies where a reported fault came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceIdentity {
    /// Name of the dispatcher that ran the batch.
    pub dispatcher: String,
    /// The unit within that batch.
    pub unit: UnitId,
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dispatcher, self.unit)
    }
}

/// A non-fatal, per-unit failure handed to [`Host::report`][crate::Host::report].
#[derive(Debug)]
pub struct ErrorReport {
    /// The captured fault.
    pub fault: Fault,
    /// The category it is filed under.
    pub category: ErrorCategory,
    /// Who produced it.
    pub source: SourceIdentity,
}

impl ErrorReport {
    pub(crate) fn new(fault: Fault, dispatcher: &str) -> Self {
        let source = SourceIdentity {
            dispatcher: dispatcher.to_owned(),
            unit: fault.unit(),
        };
        Self {
            fault,
            category: ErrorCategory::NotSpecified,
            source,
        }
    }

    /// Shorthand for [`Fault::error_id`].
    pub fn error_id(&self) -> &'static str {
        self.fault.error_id()
    }
}

/// The pool refused to run a task.
#[derive(Debug, thiserror::Error)]
#[error("the worker pool refused a task: {reason}")]
pub struct SpawnError {
    reason: String,
}

impl SpawnError {
    /// Create a new `SpawnError` describing why the task was refused.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A failure that aborts a whole batch before any slot is drained.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// `Execution::Current` was requested outside of a tokio runtime.
    #[cfg(feature = "tokio")]
    #[error("no tokio runtime is running on this thread")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// The pool could not accept a claim task.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}
