use futures_interleave::prelude::*;
use futures_interleave::spawn::BoxTask;
use futures_interleave::{DispatchError, Drained, SpawnError};

use rand::seq::SliceRandom;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, PartialEq)]
enum Event {
    Emit(u64),
    Report { unit: usize, kind: &'static str },
}

/// Records everything it is handed, optionally stopping after a few records.
#[derive(Default)]
struct Events {
    events: Vec<Event>,
    emit_calls: usize,
    stop_after: Option<usize>,
}

impl Events {
    fn stopping_after(n: usize) -> Self {
        Self {
            stop_after: Some(n),
            ..Self::default()
        }
    }

    fn emitted(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Emit(v) => Some(*v),
                Event::Report { .. } => None,
            })
            .collect()
    }

    fn reports(&self) -> Vec<(usize, &'static str)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Report { unit, kind } => Some((*unit, *kind)),
                Event::Emit(_) => None,
            })
            .collect()
    }
}

impl Host for Events {
    type Record = u64;

    fn emit(&mut self, record: u64) -> Result<(), EmitError> {
        self.emit_calls += 1;
        if self.stop_after == Some(self.emitted().len()) {
            return Err(EmitError::StopRequested);
        }
        self.events.push(Event::Emit(record));
        Ok(())
    }

    fn report(&mut self, report: ErrorReport) {
        self.events.push(Event::Report {
            unit: report.source.unit.index(),
            kind: report.error_id(),
        });
    }
}

/// Sleeps for the given number of milliseconds and returns it.
async fn sleeper(ms: Option<u64>) -> io::Result<u64> {
    let ms = ms.unwrap_or(0);
    sleep(Duration::from_millis(ms)).await;
    Ok(ms)
}

fn config(name: &str) -> DispatchConfig {
    DispatchConfig::new(name)
}

#[tokio::test(start_paused = true)]
async fn fastest_result_is_delivered_first() {
    let mut dispatcher = Dispatcher::new(sleeper).with_config(config("latency"));
    let mut host = Events::default();

    let drained = dispatcher.run(vec![300, 100, 200], &mut host).await.unwrap();

    assert_eq!(host.emitted(), [100, 200, 300]);
    assert_eq!(drained.emitted, 3);
    assert_eq!(drained.reported, 0);
}

#[tokio::test(start_paused = true)]
async fn completion_order_for_any_submission_order() {
    let mut latencies: Vec<u64> = (1..=24).map(|n| n * 10).collect();
    latencies.shuffle(&mut rand::thread_rng());

    let mut dispatcher = Dispatcher::new(sleeper).with_config(config("shuffled"));
    let mut host = Events::default();
    dispatcher.run(latencies.clone(), &mut host).await.unwrap();

    latencies.sort_unstable();
    assert_eq!(host.emitted(), latencies);
}

#[tokio::test(start_paused = true)]
async fn no_input_runs_the_worker_once() {
    let mut dispatcher = Dispatcher::new(|input: Option<u64>| async move {
        assert!(input.is_none());
        Ok::<_, io::Error>(42)
    })
    .with_config(config("constant"));
    let mut host = Events::default();

    let drained = dispatcher.run(Vec::new(), &mut host).await.unwrap();

    assert_eq!(host.events, [Event::Emit(42)]);
    assert_eq!(drained.total(), 1);
}

#[tokio::test(start_paused = true)]
async fn one_failure_is_isolated() {
    // The failing unit finishes last, so its report comes after the value.
    let mut dispatcher = Dispatcher::new(|ms: Option<u64>| async move {
        let ms = ms.unwrap_or(0);
        sleep(Duration::from_millis(ms)).await;
        if ms == 50 {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "too slow"));
        }
        Ok(ms)
    })
    .with_config(config("partial"));
    let mut host = Events::default();

    let drained = dispatcher.run(vec![50, 10], &mut host).await.unwrap();

    assert_eq!(
        host.events,
        [
            Event::Emit(10),
            Event::Report {
                unit: 0,
                kind: "WorkerFault"
            },
        ]
    );
    assert_eq!(
        drained,
        Drained {
            emitted: 1,
            reported: 1,
            discarded: 0,
            stopped: false
        }
    );
}

#[tokio::test(start_paused = true)]
async fn failure_among_many_keeps_completion_order() {
    let mut dispatcher = Dispatcher::new(|ms: Option<u64>| async move {
        let ms = ms.unwrap_or(0);
        sleep(Duration::from_millis(ms)).await;
        match ms {
            30 => Err(io::Error::new(io::ErrorKind::Other, "boom")),
            ms => Ok(ms),
        }
    })
    .with_config(config("many"));
    let mut host = Events::default();

    dispatcher.run(vec![40, 30, 20, 10], &mut host).await.unwrap();

    assert_eq!(
        host.events,
        [
            Event::Emit(10),
            Event::Emit(20),
            Event::Report {
                unit: 1,
                kind: "WorkerFault"
            },
            Event::Emit(40),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn stop_suppresses_emission_but_not_faults() {
    let mut dispatcher = Dispatcher::new(|ms: Option<u64>| async move {
        let ms = ms.unwrap_or(0);
        sleep(Duration::from_millis(ms)).await;
        if ms == 40 {
            return Err(io::Error::new(io::ErrorKind::Other, "separate fault"));
        }
        Ok(ms)
    })
    .with_config(config("stop"));
    let mut host = Events::stopping_after(1);

    let drained = dispatcher
        .run(vec![10, 20, 30, 40, 50], &mut host)
        .await
        .unwrap();

    // 10 is emitted, 20 triggers the stop, 30 and 50 are discarded without
    // calling emit again, and the fault of 40 is still reported.
    assert_eq!(
        host.events,
        [
            Event::Emit(10),
            Event::Report {
                unit: 3,
                kind: "WorkerFault"
            },
        ]
    );
    assert_eq!(host.emit_calls, 2);
    assert_eq!(
        drained,
        Drained {
            emitted: 1,
            reported: 1,
            discarded: 2,
            stopped: true
        }
    );
}

#[tokio::test(start_paused = true)]
async fn panics_are_reported_not_propagated() {
    let mut dispatcher = Dispatcher::new(|ms: Option<u64>| async move {
        let ms = ms.unwrap_or(0);
        sleep(Duration::from_millis(ms)).await;
        assert_ne!(ms, 20, "worker invariant broken");
        Ok::<_, io::Error>(ms)
    })
    .with_config(config("panics"));
    let mut host = Events::default();

    dispatcher.run(vec![30, 20, 10], &mut host).await.unwrap();

    assert_eq!(host.emitted(), [10, 30]);
    assert_eq!(host.reports(), [(1, "WorkerPanic")]);
}

#[tokio::test(start_paused = true)]
async fn inline_and_pool_agree() {
    let latencies = vec![70, 10, 50, 30, 60, 20, 40];

    let mut pooled = Dispatcher::new(sleeper).with_config(config("pool"));
    let mut pool_host = Events::default();
    pooled.run(latencies.clone(), &mut pool_host).await.unwrap();

    let mut inline =
        Dispatcher::new(sleeper).with_config(config("inline").execution(Execution::Inline));
    let mut inline_host = Events::default();
    inline.run(latencies, &mut inline_host).await.unwrap();

    assert_eq!(pool_host.emitted(), [10, 20, 30, 40, 50, 60, 70]);
    assert_eq!(pool_host.events, inline_host.events);
}

#[tokio::test(start_paused = true)]
async fn explicit_pool_handle() {
    let pool = Execution::pool(tokio::runtime::Handle::current());
    let mut dispatcher = Dispatcher::new(sleeper).with_config(config("handle").execution(pool));
    let mut host = Events::default();

    dispatcher.run(vec![2, 1], &mut host).await.unwrap();
    assert_eq!(host.emitted(), [1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_completions_claim_unique_slots() {
    const UNITS: u64 = 512;

    let mut dispatcher = Dispatcher::new(|n: Option<u64>| async move {
        let n = n.unwrap_or(0);
        for _ in 0..(n % 5) {
            tokio::task::yield_now().await;
        }
        Ok::<_, io::Error>(n)
    })
    .with_config(config("parallel"));
    let mut host = Events::default();

    let drained = dispatcher.run(0..UNITS, &mut host).await.unwrap();

    let mut seen = host.emitted();
    assert_eq!(seen.len() as u64, UNITS);
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len() as u64, UNITS, "a unit was delivered twice");
    assert_eq!(drained.total() as u64, UNITS);
}

#[tokio::test]
async fn pool_shutdown_abandons_units() {
    let pool = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut dispatcher = Dispatcher::new(|_: Option<u64>| async move {
        std::future::pending::<()>().await;
        Ok::<u64, io::Error>(0)
    })
    .with_config(config("abandoned").execution(Execution::pool(pool.handle().clone())));
    let mut host = Events::default();

    // The pool never gets to run its tasks: shutting it down drops them.
    let (drained, ()) = tokio::join!(dispatcher.run(vec![1, 2, 3], &mut host), async move {
        tokio::task::yield_now().await;
        pool.shutdown_background();
    });

    let drained = drained.unwrap();
    assert_eq!(drained.reported, 3);
    let mut reports = host.reports();
    reports.sort_unstable();
    assert_eq!(
        reports,
        [
            (0, "UnitAbandoned"),
            (1, "UnitAbandoned"),
            (2, "UnitAbandoned")
        ]
    );
}

#[tokio::test]
async fn refused_spawn_is_fatal() {
    struct Closed;

    impl Spawn for Closed {
        fn spawn(&self, _task: BoxTask) -> Result<(), SpawnError> {
            Err(SpawnError::new("pool exhausted"))
        }
    }

    let mut dispatcher =
        Dispatcher::new(sleeper).with_config(config("closed").execution(Execution::pool(Closed)));
    let mut host = Events::default();

    let res = dispatcher.run(vec![1], &mut host).await;
    assert!(matches!(res, Err(DispatchError::Spawn(_))));
    assert!(host.events.is_empty());
}

#[tokio::test(start_paused = true)]
async fn shared_state_across_units() {
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let worker = {
        let calls = calls.clone();
        move |ms: Option<u64>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                sleeper(ms).await
            }
        }
    };
    let mut dispatcher = Dispatcher::new(worker).with_config(config("shared"));
    let mut host = Events::default();

    dispatcher.run(vec![5, 3, 1], &mut host).await.unwrap();
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert_eq!(host.emitted(), [1, 3, 5]);
}
