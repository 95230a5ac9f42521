use anyhow::Result;
use rand::Rng;
use rpc_stress::{
    run_benchmark, AggregateMetrics, BenchError, BenchmarkConfig, BenchmarkRunner,
    BenchmarkSpec, Completion, FnExecutor, Shutdown, Termination,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Generator yielding 0, 1, 2, ... and counting its own calls
fn counting_generator(calls: Arc<AtomicU64>) -> impl FnMut() -> u64 + Send + 'static {
    move || calls.fetch_add(1, Ordering::SeqCst)
}

/// Executor that fails every request whose id is a multiple of `modulus`
fn failing_every(
    modulus: u64,
) -> FnExecutor<impl Fn(u64) -> std::future::Ready<anyhow::Result<Completion>>> {
    FnExecutor::new(move |id: u64| {
        std::future::ready(if id % modulus == 0 {
            Ok(Completion::failure("rejected"))
        } else {
            Ok(Completion::success())
        })
    })
}

/// Executor where every request succeeds immediately
fn succeeding() -> FnExecutor<impl Fn(u64) -> std::future::Ready<anyhow::Result<Completion>>> {
    FnExecutor::new(|_: u64| std::future::ready(Ok(Completion::success())))
}

type BoxedCompletion = Pin<Box<dyn Future<Output = anyhow::Result<Completion>> + Send>>;

/// Executor that sleeps for `request` milliseconds
fn sleeping_executor() -> FnExecutor<impl Fn(u64) -> BoxedCompletion> {
    FnExecutor::new(|ms: u64| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(Completion::success())
        }) as BoxedCompletion
    })
}

#[tokio::test]
async fn every_request_is_generated_and_aggregated_exactly_once() -> Result<()> {
    let calls = Arc::new(AtomicU64::new(0));
    let spec = BenchmarkSpec::new(
        BenchmarkConfig::new(200, 7),
        counting_generator(calls.clone()),
        succeeding(),
    );

    let metrics = run_benchmark(spec).await?;
    assert_eq!(metrics.processed, 200);
    assert_eq!(metrics.failures, 0);
    assert_eq!(metrics.termination, Termination::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 200);
    Ok(())
}

#[tokio::test]
async fn result_is_independent_of_concurrency() -> Result<()> {
    const N: u64 = 12;
    for concurrency in 1..=N as usize {
        let calls = Arc::new(AtomicU64::new(0));
        let spec = BenchmarkSpec::new(
            BenchmarkConfig::new(N, concurrency),
            counting_generator(calls),
            failing_every(3),
        );

        let metrics = run_benchmark(spec).await?;
        assert_eq!(metrics.processed, N, "concurrency {}", concurrency);
        // ids 0, 3, 6, 9
        assert_eq!(metrics.failures, 4, "concurrency {}", concurrency);
    }
    Ok(())
}

#[tokio::test]
async fn more_workers_than_requests() -> Result<()> {
    let calls = Arc::new(AtomicU64::new(0));
    let spec = BenchmarkSpec::new(
        BenchmarkConfig::new(3, 50),
        counting_generator(calls.clone()),
        succeeding(),
    );

    let metrics = run_benchmark(spec).await?;
    assert_eq!(metrics.processed, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn zero_requests_do_no_work() -> Result<()> {
    let calls = Arc::new(AtomicU64::new(0));
    let spec = BenchmarkSpec::new(
        BenchmarkConfig::new(0, 4),
        counting_generator(calls.clone()),
        failing_every(1),
    );

    let metrics = run_benchmark(spec).await?;
    assert_eq!(metrics, AggregateMetrics::empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn zero_concurrency_is_a_configuration_error() {
    let spec = BenchmarkSpec::new(
        BenchmarkConfig::new(10, 0),
        counting_generator(Arc::new(AtomicU64::new(0))),
        failing_every(1),
    );
    let err = run_benchmark(spec).await.unwrap_err();
    assert!(matches!(err, BenchError::Config(_)));
}

#[tokio::test(start_paused = true)]
async fn fixed_latency_sums_exactly() -> Result<()> {
    let spec = BenchmarkSpec::new(BenchmarkConfig::new(100, 10), || 2u64, sleeping_executor());

    let metrics = run_benchmark(spec).await?;
    assert_eq!(metrics.processed, 100);
    assert_eq!(metrics.failures, 0);
    assert_eq!(metrics.total_elapsed, Duration::from_millis(200));
    assert_eq!(metrics.average_elapsed(), Some(Duration::from_millis(2)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failures_still_count_towards_latency() -> Result<()> {
    let calls = Arc::new(AtomicU64::new(0));
    let executor = FnExecutor::new(|id: u64| async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        if id % 2 == 1 {
            anyhow::bail!("request {} timed out", id);
        }
        Ok(Completion::success())
    });
    let spec = BenchmarkSpec::new(
        BenchmarkConfig::new(10, 1),
        counting_generator(calls),
        executor,
    );

    let metrics = run_benchmark(spec).await?;
    assert_eq!(metrics.processed, 10);
    assert_eq!(metrics.failures, 5);
    assert_eq!(metrics.successes(), 5);
    assert_eq!(metrics.total_elapsed, Duration::from_millis(10));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn completion_order_does_not_change_the_aggregate() -> Result<()> {
    let latencies: Vec<u64> = {
        let mut rng = rand::thread_rng();
        (0..64).map(|_| rng.gen_range(1..=20)).collect()
    };
    let expected_total: u64 = latencies.iter().sum();

    let mut totals = Vec::new();
    for concurrency in [1, 3, 16] {
        let mut queue = latencies.clone().into_iter();
        let generator = move || queue.next().unwrap_or(1);
        let spec = BenchmarkSpec::new(
            BenchmarkConfig::new(latencies.len() as u64, concurrency),
            generator,
            sleeping_executor(),
        );

        let metrics = run_benchmark(spec).await?;
        assert_eq!(metrics.processed, 64);
        totals.push(metrics.total_elapsed);
    }

    for total in totals {
        assert_eq!(total, Duration::from_millis(expected_total));
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn in_flight_requests_never_exceed_concurrency() -> Result<()> {
    const CONCURRENCY: usize = 4;
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let executor = {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        FnExecutor::new(move |_: u64| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Completion::success())
            }
        })
    };

    let spec = BenchmarkSpec::new(BenchmarkConfig::new(40, CONCURRENCY), || 0u64, executor);
    let metrics = run_benchmark(spec).await?;

    assert_eq!(metrics.processed, 40);
    assert!(peak.load(Ordering::SeqCst) <= CONCURRENCY);
    assert!(peak.load(Ordering::SeqCst) > 1);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
#[should_panic(expected = "generator exploded")]
async fn generator_panic_reaches_the_caller() {
    let mut calls = 0u32;
    let generator = move || {
        calls += 1;
        if calls == 3 {
            panic!("generator exploded");
        }
        u64::from(calls)
    };
    let spec = BenchmarkSpec::new(BenchmarkConfig::new(10, 2), generator, succeeding());
    let _ = run_benchmark(spec).await;
}

#[tokio::test]
#[should_panic(expected = "executor exploded")]
async fn executor_panic_reaches_the_caller() {
    let executor = FnExecutor::new(|id: u64| async move {
        if id == 5 {
            panic!("executor exploded");
        }
        Ok(Completion::success())
    });
    let calls = Arc::new(AtomicU64::new(0));
    let spec = BenchmarkSpec::new(BenchmarkConfig::new(10, 2), counting_generator(calls), executor);
    let _ = run_benchmark(spec).await;
}

#[tokio::test(start_paused = true)]
async fn deadline_returns_partial_aggregate_around_a_hung_request() -> Result<()> {
    let executor = FnExecutor::new(|id: u64| async move {
        if id == 0 {
            std::future::pending::<()>().await;
        }
        Ok(Completion::success())
    });
    let calls = Arc::new(AtomicU64::new(0));
    let config = BenchmarkConfig::new(5, 2).with_deadline(Duration::from_secs(1));
    let spec = BenchmarkSpec::new(config, counting_generator(calls), executor);

    let metrics = run_benchmark(spec).await?;
    assert_eq!(metrics.termination, Termination::DeadlineExceeded);
    assert_eq!(metrics.processed, 4);
    assert!(!metrics.is_complete());
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_the_run_early() -> Result<()> {
    let shutdown = Shutdown::new();
    let executor = {
        let shutdown = shutdown.clone();
        FnExecutor::new(move |id: u64| {
            if id == 3 {
                shutdown.trigger();
            }
            std::future::ready(Ok(Completion::success()))
        })
    };
    let calls = Arc::new(AtomicU64::new(0));
    let spec = BenchmarkSpec::new(
        BenchmarkConfig::new(10_000, 1),
        counting_generator(calls.clone()),
        executor,
    );

    let metrics = BenchmarkRunner::new("cancel")
        .with_shutdown(shutdown)
        .run(spec)
        .await?;
    assert_eq!(metrics.termination, Termination::Cancelled);
    assert!(metrics.processed < 10_000);
    assert!(calls.load(Ordering::SeqCst) < 10_000);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_counts_requests_already_in_flight() -> Result<()> {
    let started = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicU64::new(0));
    let executor = {
        let started = started.clone();
        let finished = finished.clone();
        FnExecutor::new(move |_: u64| {
            let started = started.clone();
            let finished = finished.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(Completion::success())
            }
        })
    };

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.trigger();
    });

    let begin = tokio::time::Instant::now();
    let spec = BenchmarkSpec::new(BenchmarkConfig::new(100, 4), || 0u64, executor);
    let metrics = BenchmarkRunner::new("drain")
        .with_shutdown(shutdown)
        .run(spec)
        .await?;

    assert_eq!(metrics.termination, Termination::Cancelled);
    assert_eq!(started.load(Ordering::SeqCst), 4);
    assert_eq!(finished.load(Ordering::SeqCst), 4);
    assert_eq!(metrics.processed, 4);
    assert_eq!(metrics.failures, 0);
    assert_eq!(metrics.total_elapsed, Duration::from_millis(400));
    // Returned once the in-flight batch finished, without starting another
    let waited = begin.elapsed();
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_millis(200));
    Ok(())
}
