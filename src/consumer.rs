//! # Consumer / Aggregator
//!
//! Drains outcomes until exactly `expected` of them have been observed and
//! folds them into an [`AggregateMetrics`].
//!
//! Termination is count-based, not close-based: the consumer returns as soon
//! as the `expected`-th outcome arrives, without waiting for the channel to
//! close. This trusts the worker pool to produce exactly one outcome per
//! dispatched request. Without a shutdown signal or deadline, a pipeline
//! that stalls short of `expected` keeps the consumer waiting. A pipeline
//! whose channel closes short of `expected` is reported as
//! [`BenchError::Underdelivered`]; it is never passed off as a completed run.
//!
//! A shutdown does not drop work already started: after the signal fires the
//! consumer keeps receiving until the workers have exited and the outcome
//! channel is closed, so every request that was in flight is still counted.
//! The deadline bounds that drain as well.

use crate::error::{BenchError, Result};
use crate::metrics::{AggregateMetrics, Outcome, OutcomeAccumulator, Termination};
use crate::shutdown::Shutdown;
use std::future::pending;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Why the receive loop stopped early
enum Interrupt {
    Cancelled,
    Deadline,
}

/// Aggregates a fixed number of outcomes
pub struct Consumer {
    expected: u64,
    percentiles: Vec<f64>,
    deadline: Option<Instant>,
    shutdown: Option<Shutdown>,
}

impl Consumer {
    pub fn new(expected: u64, percentiles: Vec<f64>) -> Self {
        Self {
            expected,
            percentiles,
            deadline: None,
            shutdown: None,
        }
    }

    /// Stop waiting at `deadline` and return a partial aggregate
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Stop expecting new outcomes when `shutdown` fires
    ///
    /// Outcomes of requests already executing are still collected.
    pub fn with_shutdown(mut self, shutdown: Option<Shutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Receive and aggregate outcomes
    ///
    /// ## Returns
    /// - `Ok(metrics)` with `Termination::Completed` once `expected` outcomes arrived
    /// - `Ok(metrics)` with a partial count if the deadline fired first
    /// - `Ok(metrics)` with `Termination::Cancelled` once in-flight outcomes
    ///   have drained after a shutdown
    /// - `Err(BenchError::Underdelivered)` if every sender went away first
    pub async fn run(self, mut outcomes: mpsc::Receiver<Outcome>) -> Result<AggregateMetrics> {
        let mut acc = OutcomeAccumulator::new()?;

        while acc.processed() < self.expected {
            let next = tokio::select! {
                biased;
                _ = Self::wait_shutdown(self.shutdown.as_ref()) => Err(Interrupt::Cancelled),
                _ = Self::wait_deadline(self.deadline) => Err(Interrupt::Deadline),
                received = outcomes.recv() => Ok(received),
            };

            match next {
                Ok(Some(outcome)) => acc.record(&outcome)?,
                Ok(None) => {
                    return Err(BenchError::Underdelivered {
                        expected: self.expected,
                        received: acc.processed(),
                    });
                }
                Err(interrupt) => {
                    let termination = match interrupt {
                        Interrupt::Cancelled => self.drain(&mut acc, &mut outcomes).await?,
                        Interrupt::Deadline => Termination::DeadlineExceeded,
                    };
                    if termination == Termination::Completed {
                        break;
                    }
                    info!(
                        processed = acc.processed(),
                        expected = self.expected,
                        %termination,
                        "Consumer stopped before all outcomes arrived"
                    );
                    return Ok(acc.finish(termination, &self.percentiles));
                }
            }
        }

        debug!(processed = acc.processed(), "Consumer observed every outcome");
        Ok(acc.finish(Termination::Completed, &self.percentiles))
    }

    /// Collect the outcomes of requests still in flight after a shutdown
    ///
    /// Workers stop taking new requests once the signal fires, so the channel
    /// closes as soon as the last in-flight execution has reported.
    async fn drain(
        &self,
        acc: &mut OutcomeAccumulator,
        outcomes: &mut mpsc::Receiver<Outcome>,
    ) -> Result<Termination> {
        let before = acc.processed();
        while acc.processed() < self.expected {
            tokio::select! {
                biased;
                _ = Self::wait_deadline(self.deadline) => {
                    debug!(drained = acc.processed() - before, "Deadline hit while draining");
                    return Ok(Termination::DeadlineExceeded);
                }
                received = outcomes.recv() => match received {
                    Some(outcome) => acc.record(&outcome)?,
                    None => break,
                },
            }
        }
        debug!(drained = acc.processed() - before, "Drained in-flight outcomes");
        if acc.processed() == self.expected {
            Ok(Termination::Completed)
        } else {
            Ok(Termination::Cancelled)
        }
    }

    async fn wait_shutdown(shutdown: Option<&Shutdown>) {
        match shutdown {
            Some(signal) => signal.triggered().await,
            None => pending().await,
        }
    }

    async fn wait_deadline(deadline: Option<Instant>) {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => pending().await,
        }
    }
}
