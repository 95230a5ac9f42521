//! # Worker Pool
//!
//! A fixed set of `concurrency` tokio tasks sharing one request receiver.
//! The shared receiver is the fan-out: at most `concurrency` requests are
//! ever in flight, and a worker that is stuck inside `execute` holds only
//! its own slot while the others keep draining the channel.
//!
//! ## Worker Loop
//!
//! 1. **Receive**: take the next request, or exit once the channel is closed and empty
//! 2. **Execute**: call the shared [`Executor`], measuring wall-clock time around it
//! 3. **Classify**: `Err(_)` or an unsuccessful [`Completion`](crate::executor::Completion) is a failure
//! 4. **Report**: send exactly one [`Outcome`] for the request, then loop
//!
//! Workers share nothing mutable besides the two channels, so there is no
//! locking on the hot path. Surplus workers (`concurrency > request_count`)
//! see the channel close without receiving anything and exit quietly.

use crate::executor::Executor;
use crate::metrics::Outcome;
use crate::shutdown::Shutdown;
use async_channel::Receiver;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Per-worker counters, returned when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub executed: u64,
    pub failures: u64,
}

/// One execution unit of the pool
pub struct Worker<R, E> {
    id: usize,
    executor: Arc<E>,
    requests: Receiver<R>,
    outcomes: mpsc::Sender<Outcome>,
    shutdown: Option<Shutdown>,
}

impl<R, E> Worker<R, E>
where
    R: Send + 'static,
    E: Executor<R>,
{
    pub fn new(
        id: usize,
        executor: Arc<E>,
        requests: Receiver<R>,
        outcomes: mpsc::Sender<Outcome>,
        shutdown: Option<Shutdown>,
    ) -> Self {
        Self {
            id,
            executor,
            requests,
            outcomes,
            shutdown,
        }
    }

    /// Run until the request channel is closed and drained
    pub async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats {
            worker_id: self.id,
            ..WorkerStats::default()
        };

        loop {
            let request = match &self.shutdown {
                Some(signal) => tokio::select! {
                    biased;
                    _ = signal.triggered() => {
                        debug!(worker_id = self.id, "Worker received shutdown signal");
                        break;
                    }
                    received = self.requests.recv() => received,
                },
                None => self.requests.recv().await,
            };

            // Err means closed and empty
            let Ok(request) = request else {
                break;
            };

            let outcome = self.execute_one(request).await;
            stats.executed += 1;
            if !outcome.success {
                stats.failures += 1;
            }

            if self.outcomes.send(outcome).await.is_err() {
                debug!(worker_id = self.id, "Outcome channel closed, worker stopping");
                break;
            }
        }

        debug!(
            worker_id = self.id,
            executed = stats.executed,
            failures = stats.failures,
            "Worker finished"
        );
        stats
    }

    /// Execute one request and turn the result into an outcome
    async fn execute_one(&self, request: R) -> Outcome {
        let start = Instant::now();
        let result = self.executor.execute(request).await;
        let elapsed = start.elapsed();

        match result {
            Ok(completion) if completion.success => {
                Outcome::success(elapsed).with_size(completion.size)
            }
            Ok(completion) => {
                let status = completion
                    .status
                    .unwrap_or_else(|| "request rejected".to_string());
                debug!(worker_id = self.id, status = %status, "Request rejected");
                Outcome::failure(elapsed, status).with_size(completion.size)
            }
            Err(e) => {
                warn!(worker_id = self.id, error = %e, "Request failed");
                Outcome::failure(elapsed, e.to_string())
            }
        }
    }
}

/// Spawns and owns the pool's worker tasks
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency }
    }

    /// Spawn `concurrency` workers onto the current runtime
    ///
    /// Each worker holds its own clone of the receiver and of the outcome
    /// sender. The outcome channel closes once every worker has exited.
    pub fn spawn<R, E>(
        &self,
        executor: Arc<E>,
        requests: Receiver<R>,
        outcomes: mpsc::Sender<Outcome>,
        shutdown: Option<Shutdown>,
    ) -> JoinSet<WorkerStats>
    where
        R: Send + 'static,
        E: Executor<R>,
    {
        let mut workers = JoinSet::new();
        for id in 0..self.concurrency {
            let worker = Worker::new(
                id,
                executor.clone(),
                requests.clone(),
                outcomes.clone(),
                shutdown.clone(),
            );
            workers.spawn(worker.run());
        }
        debug!(concurrency = self.concurrency, "Worker pool started");
        workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Completion, FnExecutor};
    use std::time::Duration;

    fn classify_executor() -> Arc<impl Executor<i32>> {
        Arc::new(FnExecutor::new(|n: i32| async move {
            match n {
                n if n < 0 => anyhow::bail!("negative input {}", n),
                0 => Ok(Completion::failure("404 Not Found")),
                n => Ok(Completion::success().with_size(n as u64)),
            }
        }))
    }

    #[tokio::test]
    async fn test_worker_classifies_outcomes() {
        let (req_tx, req_rx) = async_channel::unbounded();
        let (out_tx, mut out_rx) = mpsc::channel(8);
        for n in [5, 0, -1] {
            req_tx.send(n).await.unwrap();
        }
        drop(req_tx);

        let stats = Worker::new(0, classify_executor(), req_rx, out_tx, None)
            .run()
            .await;
        assert_eq!(stats.executed, 3);
        assert_eq!(stats.failures, 2);

        let ok = out_rx.recv().await.unwrap();
        assert!(ok.success);
        assert_eq!(ok.size, Some(5));
        assert!(ok.error.is_none());

        let rejected = out_rx.recv().await.unwrap();
        assert!(!rejected.success);
        assert_eq!(rejected.error.as_deref(), Some("404 Not Found"));

        let failed = out_rx.recv().await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("negative input -1"));
        assert!(failed.size.is_none());

        // Worker dropped its sender on exit
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_times_execution() {
        let executor = Arc::new(FnExecutor::new(|_: ()| async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            Ok(Completion::success())
        }));
        let (req_tx, req_rx) = async_channel::bounded(1);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        req_tx.send(()).await.unwrap();
        drop(req_tx);

        Worker::new(0, executor, req_rx, out_tx, None).run().await;
        let outcome = out_rx.recv().await.unwrap();
        assert_eq!(outcome.elapsed, Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_surplus_workers_exit_cleanly() {
        let (req_tx, req_rx) = async_channel::bounded(1);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let pool = WorkerPool::new(8);
        let mut workers = pool.spawn(classify_executor(), req_rx, out_tx, None);

        req_tx.send(1).await.unwrap();
        req_tx.send(2).await.unwrap();
        drop(req_tx);

        let mut executed = 0;
        let mut finished = 0;
        while let Some(joined) = workers.join_next().await {
            executed += joined.unwrap().executed;
            finished += 1;
        }
        assert_eq!(finished, 8);
        assert_eq!(executed, 2);

        let mut outcomes = 0;
        while out_rx.recv().await.is_some() {
            outcomes += 1;
        }
        assert_eq!(outcomes, 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_workers() {
        let (_req_tx, req_rx) = async_channel::bounded::<i32>(1);
        let (out_tx, _out_rx) = mpsc::channel(1);
        let shutdown = Shutdown::new();
        let mut workers = WorkerPool::new(3).spawn(
            classify_executor(),
            req_rx,
            out_tx,
            Some(shutdown.clone()),
        );

        shutdown.trigger();
        let mut finished = 0;
        while let Some(joined) = tokio::time::timeout(Duration::from_secs(1), workers.join_next())
            .await
            .expect("workers should stop after shutdown")
        {
            assert_eq!(joined.unwrap().executed, 0);
            finished += 1;
        }
        assert_eq!(finished, 3);
    }
}
