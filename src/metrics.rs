use crate::error::Result;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of executing one request
///
/// Created by a worker and consumed exactly once by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub elapsed: Duration,
    pub success: bool,
    pub error: Option<String>,
    pub size: Option<u64>,
}

impl Outcome {
    pub fn success(elapsed: Duration) -> Self {
        Self {
            elapsed,
            success: true,
            error: None,
            size: None,
        }
    }

    pub fn failure(elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            elapsed,
            success: false,
            error: Some(error.into()),
            size: None,
        }
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }
}

/// How a benchmark run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Exactly `request_count` outcomes were aggregated
    Completed,
    /// The shutdown signal fired before the run finished
    Cancelled,
    /// The configured deadline elapsed before the run finished
    DeadlineExceeded,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Completed => write!(f, "completed"),
            Termination::Cancelled => write!(f, "cancelled"),
            Termination::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Percentile value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ns: u64,
}

/// Latency distribution over every aggregated outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub std_dev_ns: f64,
    pub percentiles: Vec<PercentileValue>,
}

impl LatencySummary {
    /// Look up a percentile that was requested when the run was configured
    pub fn percentile(&self, p: f64) -> Option<u64> {
        self.percentiles
            .iter()
            .find(|v| (v.percentile - p).abs() < 0.01)
            .map(|v| v.value_ns)
    }
}

/// Summary statistics for one benchmark run
///
/// `processed == request_count` whenever `termination` is `Completed`.
/// Failed outcomes still contribute their elapsed time and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub processed: u64,
    pub total_elapsed: Duration,
    pub failures: u64,
    pub total_size: u64,
    pub latency: Option<LatencySummary>,
    pub termination: Termination,
}

impl AggregateMetrics {
    /// The aggregate of a run that had nothing to do
    pub fn empty() -> Self {
        Self {
            processed: 0,
            total_elapsed: Duration::ZERO,
            failures: 0,
            total_size: 0,
            latency: None,
            termination: Termination::Completed,
        }
    }

    /// `total_elapsed / processed`, truncated to whole nanoseconds
    ///
    /// `None` when nothing was processed.
    pub fn average_elapsed(&self) -> Option<Duration> {
        if self.processed == 0 {
            return None;
        }
        let avg_ns = self.total_elapsed.as_nanos() / u128::from(self.processed);
        Some(Duration::from_nanos(avg_ns as u64))
    }

    pub fn successes(&self) -> u64 {
        self.processed - self.failures
    }

    /// Failed fraction of processed outcomes (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.failures as f64 / self.processed as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Completed
    }
}

/// Latency collector using HDR histogram
pub struct LatencyCollector {
    histogram: Histogram<u64>,
}

impl LatencyCollector {
    /// Create a new latency collector
    pub fn new() -> Result<Self> {
        // 3 significant figures, auto-resizing range
        let histogram = Histogram::<u64>::new(3)?;
        Ok(Self { histogram })
    }

    /// Record a latency measurement
    pub fn record(&mut self, latency: Duration) -> Result<()> {
        // Zero is outside an HDR histogram's lowest discernible value
        let latency_ns = (latency.as_nanos() as u64).max(1);
        self.histogram.record(latency_ns)?;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Summarize the recorded samples, or `None` if there are none
    pub fn summary(&self, percentiles: &[f64]) -> Option<LatencySummary> {
        if self.histogram.is_empty() {
            return None;
        }

        let percentiles = percentiles
            .iter()
            .map(|&p| PercentileValue {
                percentile: p,
                value_ns: self.histogram.value_at_percentile(p),
            })
            .collect();

        Some(LatencySummary {
            min_ns: self.histogram.min(),
            max_ns: self.histogram.max(),
            mean_ns: self.histogram.mean(),
            std_dev_ns: self.histogram.stdev(),
            percentiles,
        })
    }
}

/// Running totals folded over outcomes
///
/// The fold is commutative, so the order in which workers finish never
/// affects the result.
pub struct OutcomeAccumulator {
    processed: u64,
    total_elapsed: Duration,
    failures: u64,
    total_size: u64,
    latency: LatencyCollector,
}

impl OutcomeAccumulator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            processed: 0,
            total_elapsed: Duration::ZERO,
            failures: 0,
            total_size: 0,
            latency: LatencyCollector::new()?,
        })
    }

    /// Fold one outcome into the totals
    pub fn record(&mut self, outcome: &Outcome) -> Result<()> {
        self.processed += 1;
        self.total_elapsed += outcome.elapsed;
        if !outcome.success {
            self.failures += 1;
        }
        if let Some(size) = outcome.size {
            self.total_size += size;
        }
        self.latency.record(outcome.elapsed)
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn finish(self, termination: Termination, percentiles: &[f64]) -> AggregateMetrics {
        AggregateMetrics {
            processed: self.processed,
            total_elapsed: self.total_elapsed,
            failures: self.failures,
            total_size: self.total_size,
            latency: self.latency.summary(percentiles),
            termination,
        }
    }
}
