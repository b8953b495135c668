//! Concurrent fan-out/fan-in which hands results back in completion order.
//!
//! Given a batch of independent inputs, this library runs one unit of work
//! per input, all of them concurrently, and streams the results to a single
//! consumer in the order the units *finish*, not the order they were
//! submitted. A fast result is delivered while slow ones are still running.
//!
//! Ordering rests on a single atomic counter per batch: each unit, when it
//! finishes, takes the next index from the counter and files itself into the
//! completion slot with that index. The consumer simply awaits slot `0`,
//! then slot `1`, and so on.
//!
//! # Operations
//!
//! - [`unit::submit`]: wrap every input in a [`unit::WorkUnit`] which never
//!   fails or panics into its caller.
//! - [`interleave::interleave`]: pair units with completion slots, ordered by
//!   completion.
//! - [`consumer::drain`]: deliver every slot to a [`Host`], reporting
//!   failures without stopping.
//! - [`Dispatcher`]: all of the above for one batch, composed from a worker
//!   and a post-processing step.
//!
//! # Examples
//!
//! Results arrive as units finish:
//!
//! ```rust
//! use futures_interleave::{Dispatcher, DispatchConfig, EmitError, ErrorReport, Host};
//! use std::time::Duration;
//!
//! struct Print;
//!
//! impl Host for Print {
//!     type Record = u64;
//!
//!     fn emit(&mut self, ms: u64) -> Result<(), EmitError> {
//!         println!("{ms}ms");
//!         Ok(())
//!     }
//!
//!     fn report(&mut self, report: ErrorReport) {
//!         eprintln!("{}", report.fault);
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let mut dispatcher = Dispatcher::new(|ms: Option<u64>| async move {
//!     let ms = ms.unwrap_or_default();
//!     tokio::time::sleep(Duration::from_millis(ms)).await;
//!     Ok::<_, std::io::Error>(ms)
//! })
//! .with_config(DispatchConfig::new("sleepers"));
//!
//! // Prints 100ms, 200ms, 300ms.
//! let drained = dispatcher.run(vec![300, 100, 200], &mut Print).await.unwrap();
//! assert_eq!(drained.emitted, 3);
//! # }
//! ```
//!
//! # Features
//!
//! - `tokio` (default): run units on the current tokio runtime via
//!   [`Execution::Current`], and use any [`tokio::runtime::Handle`] as a
//!   [`Spawn`] pool.
//!
//! # Limitations
//!
//! Every unit of a batch is started at once; there is no concurrency limit.
//! Units are never cancelled: if the host stops accepting output, units still
//! running finish in the background and their results are dropped.

#![deny(missing_debug_implementations, nonstandard_style)]
#![warn(missing_docs, unreachable_pub)]

pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod interleave;
pub mod spawn;
pub mod unit;

pub use consumer::{Drained, EmitEach, EmitValue, Host, PostProcess};
pub use dispatch::{DispatchConfig, Dispatcher};
pub use error::{
    BoxError, DispatchError, EmitError, ErrorCategory, ErrorReport, Fault, SourceIdentity,
    SpawnError, UnitId,
};
pub use spawn::{Execution, Spawn};
pub use unit::{Finished, Outcome};

/// The futures interleave prelude.
pub mod prelude {
    pub use super::consumer::{Host, PostProcess};
    pub use super::spawn::Spawn;
    pub use super::{DispatchConfig, Dispatcher, EmitError, ErrorReport, Execution};
}
