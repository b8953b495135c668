//! Running whole batches: submit, interleave, drain.

use core::future::Future;
use std::sync::Arc;

use futures_lite::future::zip;
use tracing::Instrument;

use crate::consumer::{drain, Drained, EmitValue, Host, PostProcess};
use crate::error::{BoxError, DispatchError};
use crate::interleave::{interleave, Interleaved};
use crate::spawn::Execution;
use crate::unit::{submit_shared, Finished};

/// Settings shared by every batch a [`Dispatcher`] runs.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    name: String,
    execution: Execution,
}

impl DispatchConfig {
    /// Create a config named `name`, with the default execution strategy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            execution: Execution::default(),
        }
    }

    /// Set how work units are run.
    pub fn execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// The name faults are reported under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How work units are run.
    pub fn execution_strategy(&self) -> &Execution {
        &self.execution
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new("dispatch")
    }
}

/// Runs a worker over batches of input and feeds the results, in completion
/// order, to a host.
///
/// A dispatcher is built from two capabilities: the worker, which turns one
/// optional input into a value, and the post-processing step, which turns a
/// value into host output. By default values are emitted as-is.
///
/// # Examples
///
/// ```rust
/// use futures_interleave::{Dispatcher, DispatchConfig, EmitError, ErrorReport, Execution, Host};
/// use futures_lite::future::block_on;
///
/// #[derive(Default)]
/// struct Lines(Vec<String>);
///
/// impl Host for Lines {
///     type Record = String;
///
///     fn emit(&mut self, line: String) -> Result<(), EmitError> {
///         self.0.push(line);
///         Ok(())
///     }
///
///     fn report(&mut self, report: ErrorReport) {
///         eprintln!("{}: {}", report.source, report.fault);
///     }
/// }
///
/// let mut dispatcher = Dispatcher::new(|name: Option<&'static str>| async move {
///     Ok::<_, std::io::Error>(format!("hello {}", name.unwrap_or("world")))
/// })
/// .with_config(DispatchConfig::new("greet").execution(Execution::Inline));
///
/// let mut host = Lines::default();
/// let drained = block_on(dispatcher.run_local(Vec::new(), &mut host)).unwrap();
/// assert_eq!(drained.emitted, 1);
/// assert_eq!(host.0, ["hello world"]);
/// ```
#[derive(Debug)]
pub struct Dispatcher<W, P = EmitValue> {
    config: DispatchConfig,
    worker: Arc<W>,
    post: P,
}

impl<W> Dispatcher<W> {
    /// Create a dispatcher for `worker` with the default configuration.
    pub fn new(worker: W) -> Self {
        Self {
            config: DispatchConfig::default(),
            worker: Arc::new(worker),
            post: EmitValue,
        }
    }
}

impl<W, P> Dispatcher<W, P> {
    /// Replace the configuration.
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the post-processing step.
    pub fn post_process<P2>(self, post: P2) -> Dispatcher<W, P2> {
        Dispatcher {
            config: self.config,
            worker: self.worker,
            post,
        }
    }

    /// The dispatcher's configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run one batch over `items`.
    ///
    /// One work unit is started per item, or a single unit without input if
    /// `items` is empty. Results reach `host` in the order units finish.
    /// Per-unit failures are reported on `host` and never abort the batch.
    ///
    /// # Errors
    ///
    /// Fails only if the configured pool can't be reached or refuses a unit.
    /// Units that were already started keep running.
    pub async fn run<I, Fut, T, E, H>(
        &mut self,
        items: I,
        host: &mut H,
    ) -> Result<Drained, DispatchError>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        W: Fn(Option<I::Item>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError>,
        P: PostProcess<T, H>,
        H: Host,
    {
        let pool = self.config.execution.resolve()?;
        let units = submit_shared(items, self.worker.clone());
        let span = tracing::debug_span!("dispatch", name = %self.config.name, units = units.len());

        async {
            let interleaved = interleave(units);
            let drained = match pool {
                Some(pool) => {
                    let completions = interleaved.spawn(&*pool)?;
                    drain(completions, &mut self.post, host, &self.config.name).await
                }
                None => drive_inline(interleaved, &mut self.post, host, &self.config.name).await,
            };
            tracing::debug!(?drained, "batch drained");
            Ok::<_, DispatchError>(drained)
        }
        .instrument(span)
        .await
    }

    /// Run one batch over `items` on the current task.
    ///
    /// Like [`run`][Self::run], but units are always driven inline, so
    /// neither the worker nor its futures need to be `Send`.
    pub async fn run_local<I, Fut, T, E, H>(
        &mut self,
        items: I,
        host: &mut H,
    ) -> Result<Drained, DispatchError>
    where
        I: IntoIterator,
        W: Fn(Option<I::Item>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
        P: PostProcess<T, H>,
        H: Host,
    {
        let units = submit_shared(items, self.worker.clone());
        let span = tracing::debug_span!("dispatch", name = %self.config.name, units = units.len());

        async {
            let interleaved = interleave(units);
            let drained = drive_inline(interleaved, &mut self.post, host, &self.config.name).await;
            tracing::debug!(?drained, "batch drained");
            Ok(drained)
        }
        .instrument(span)
        .await
    }
}

/// Poll every claim alongside the consumer loop, on the current task.
async fn drive_inline<F, T, P, H>(
    interleaved: Interleaved<F, T>,
    post: &mut P,
    host: &mut H,
    source: &str,
) -> Drained
where
    F: Future<Output = Finished<T>>,
    P: PostProcess<T, H>,
    H: Host,
{
    let (claims, completions) = interleaved.into_parts();
    let (_, drained) = zip(
        futures_buffered::join_all(claims),
        drain(completions, post, host, source),
    )
    .await;
    drained
}
