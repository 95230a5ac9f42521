//! # Benchmark Controller
//!
//! Wires a [`Dispatcher`], a [`WorkerPool`] and a [`Consumer`] together for
//! one run and hands back the consumer's [`AggregateMetrics`].
//!
//! ## Pipeline
//!
//! ```text
//!  generator ──► Dispatcher ──(requests, cap 1)──► Worker × concurrency ──(outcomes)──► Consumer
//! ```
//!
//! Both channels are created fresh per run. The controller keeps no state of
//! its own besides an optional [`Shutdown`] handle.
//!
//! ## Failure Handling
//!
//! - A failed request is an outcome, counted by the consumer; the run continues.
//! - A panic in the generator or the executor is re-raised on the caller of
//!   [`BenchmarkRunner::run`] with its original payload.
//! - Without a deadline or shutdown signal, the run blocks until exactly
//!   `request_count` outcomes have been aggregated.
//! - On shutdown, no new requests are dispatched and requests already in
//!   flight finish and are counted before the run returns `Cancelled`.
//! - On deadline, tasks still running are aborted and their requests are lost.

use crate::{
    cli::Args,
    consumer::Consumer,
    dispatcher::Dispatcher,
    error::{BenchError, Result},
    executor::{Executor, RequestGenerator},
    metrics::{AggregateMetrics, Termination},
    shutdown::Shutdown,
    utils::{format_bytes, format_duration},
    worker::{WorkerPool, WorkerStats},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capacity of the request channel
///
/// Kept at one so the dispatcher never runs more than a single request ahead
/// of the workers.
const REQUEST_CHANNEL_CAPACITY: usize = 1;

/// Renders the per-run configuration for log output
struct BenchmarkConfigDisplay<'a> {
    name: &'a str,
    config: &'a BenchmarkConfig,
}

impl<'a> std::fmt::Display for BenchmarkConfigDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting Benchmark for: {}", self.name)?;
        writeln!(f, "  Request Count:      {}", self.config.request_count)?;
        writeln!(f, "  Concurrency:        {}", self.config.concurrency)?;
        if let Some(deadline) = self.config.deadline {
            writeln!(f, "  Deadline:           {}", format_duration(deadline))?;
        } else {
            writeln!(f, "  Deadline:           None")?;
        }
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Parameters for one benchmark run
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkConfig {
    /// Number of requests to generate, execute and aggregate
    pub request_count: u64,

    /// Number of workers executing requests at the same time
    ///
    /// May exceed `request_count`; surplus workers exit without doing anything.
    pub concurrency: usize,

    /// Give up after this long and return a partial aggregate
    ///
    /// `None` keeps the blocking exactly-N behavior.
    pub deadline: Option<Duration>,

    /// Percentiles reported in the latency summary
    pub percentiles: Vec<f64>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            request_count: crate::defaults::REQUEST_COUNT,
            concurrency: crate::defaults::CONCURRENCY,
            deadline: None,
            percentiles: crate::defaults::PERCENTILES.to_vec(),
        }
    }
}

impl BenchmarkConfig {
    pub fn new(request_count: u64, concurrency: usize) -> Self {
        Self {
            request_count,
            concurrency,
            ..Self::default()
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Create benchmark configuration from CLI arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Self {
            request_count: args.requests,
            concurrency: args.concurrent,
            deadline: args.deadline,
            percentiles: args.percentiles.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot finish
    ///
    /// Zero workers would leave the consumer waiting forever. Concurrency is
    /// also the outcome channel capacity and is capped at
    /// [`crate::defaults::MAX_CONCURRENCY`].
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(BenchError::config("concurrency must be greater than 0"));
        }
        if self.concurrency > crate::defaults::MAX_CONCURRENCY {
            return Err(BenchError::config(format!(
                "concurrency {} exceeds the maximum of {}",
                self.concurrency,
                crate::defaults::MAX_CONCURRENCY
            )));
        }
        if let Some(p) = self
            .percentiles
            .iter()
            .find(|p| !(**p > 0.0 && **p <= 100.0))
        {
            return Err(BenchError::config(format!(
                "percentile {} is outside (0, 100]",
                p
            )));
        }
        if self.deadline == Some(Duration::ZERO) {
            return Err(BenchError::config("deadline must be greater than 0"));
        }
        Ok(())
    }
}

/// Everything one run needs: sizing plus the two collaborators
///
/// Immutable for the lifetime of the run. Any shared transport belongs inside
/// `executor`, never in ambient state.
pub struct BenchmarkSpec<G, E> {
    pub config: BenchmarkConfig,
    pub generator: G,
    pub executor: Arc<E>,
}

impl<G, E> BenchmarkSpec<G, E> {
    pub fn new(config: BenchmarkConfig, generator: G, executor: E) -> Self {
        Self {
            config,
            generator,
            executor: Arc::new(executor),
        }
    }

    /// Build a spec around an executor that is already shared elsewhere
    pub fn with_shared_executor(config: BenchmarkConfig, generator: G, executor: Arc<E>) -> Self {
        Self {
            config,
            generator,
            executor,
        }
    }
}

/// Runs benchmark specs, optionally under a shutdown signal
#[derive(Debug, Clone, Default)]
pub struct BenchmarkRunner {
    name: String,
    shutdown: Option<Shutdown>,
}

impl BenchmarkRunner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shutdown: None,
        }
    }

    /// Stop runs early when `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run one benchmark to completion
    ///
    /// ## Returns
    /// - `Ok(metrics)` with `processed == request_count` on a completed run
    /// - `Ok(metrics)` with a partial aggregate if the deadline or shutdown fired
    /// - `Err(BenchError::Config)` for an invalid configuration
    /// - `Err(BenchError::Underdelivered)` if the pipeline lost outcomes without panicking
    ///
    /// ## Panics
    /// Re-raises any panic from the generator or the executor.
    pub async fn run<R, G, E>(&self, spec: BenchmarkSpec<G, E>) -> Result<AggregateMetrics>
    where
        R: Send + 'static,
        G: RequestGenerator<R>,
        E: Executor<R>,
    {
        let BenchmarkSpec {
            config,
            generator,
            executor,
        } = spec;

        config.validate()?;
        if config.request_count == 0 {
            debug!(name = %self.name, "Nothing to dispatch, returning empty aggregate");
            return Ok(AggregateMetrics::empty());
        }

        info!(
            "{}",
            BenchmarkConfigDisplay {
                name: &self.name,
                config: &config,
            }
        );

        let started = Instant::now();
        let (request_tx, request_rx) = async_channel::bounded(REQUEST_CHANNEL_CAPACITY);
        let (outcome_tx, outcome_rx) = mpsc::channel(config.concurrency);
        let request_closer = request_rx.clone();

        let dispatcher = tokio::spawn(
            Dispatcher::new(config.request_count, generator)
                .run(request_tx, self.shutdown.clone()),
        );
        // The pool hands each worker its own clones; ours drop here so the
        // outcome channel closes once the last worker exits.
        let workers = WorkerPool::new(config.concurrency).spawn(
            executor,
            request_rx,
            outcome_tx,
            self.shutdown.clone(),
        );

        let consumed = Consumer::new(config.request_count, config.percentiles.clone())
            .with_deadline(config.deadline.map(|d| started + d))
            .with_shutdown(self.shutdown.clone())
            .run(outcome_rx)
            .await;

        let termination = consumed.as_ref().ok().map(|m| m.termination);
        if termination != Some(Termination::Completed) {
            // No more requests will be consumed
            request_closer.close();
        }
        drop(request_closer);

        // A shutdown has already drained in-flight work. Past the deadline a
        // hung request must not keep the pipeline alive.
        let abort = termination == Some(Termination::DeadlineExceeded);
        let stats = Self::join_pipeline(dispatcher, workers, abort).await;
        let metrics = consumed?;

        info!(
            name = %self.name,
            processed = metrics.processed,
            failures = metrics.failures,
            error_rate = %format!("{:.2}%", metrics.error_rate() * 100.0),
            average = %metrics
                .average_elapsed()
                .map(format_duration)
                .unwrap_or_else(|| "n/a".to_string()),
            received = %format_bytes(metrics.total_size),
            wall_clock = %format_duration(started.elapsed()),
            workers_used = stats.iter().filter(|s| s.executed > 0).count(),
            termination = %metrics.termination,
            "Benchmark finished"
        );
        Ok(metrics)
    }

    /// Wait for the dispatcher and every worker, re-raising the first panic
    ///
    /// With `abort` set, tasks still busy are aborted rather than awaited.
    async fn join_pipeline(
        dispatcher: JoinHandle<(u64, crate::dispatcher::DispatchStatus)>,
        mut workers: JoinSet<WorkerStats>,
        abort: bool,
    ) -> Vec<WorkerStats> {
        if abort {
            dispatcher.abort();
            workers.abort_all();
        }

        if let Err(err) = dispatcher.await {
            Self::propagate_panic(err);
        }

        let mut stats = Vec::with_capacity(workers.len());
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker) => stats.push(worker),
                Err(err) => Self::propagate_panic(err),
            }
        }
        stats
    }

    fn propagate_panic(err: JoinError) {
        if err.is_panic() {
            std::panic::resume_unwind(err.into_panic());
        }
        warn!("Pipeline task was cancelled before finishing");
    }
}

/// Run one benchmark with no shutdown signal
///
/// Blocks (asynchronously) until exactly `spec.config.request_count`
/// outcomes were aggregated, unless a deadline is configured.
pub async fn run_benchmark<R, G, E>(spec: BenchmarkSpec<G, E>) -> Result<AggregateMetrics>
where
    R: Send + 'static,
    G: RequestGenerator<R>,
    E: Executor<R>,
{
    BenchmarkRunner::new("benchmark").run(spec).await
}
