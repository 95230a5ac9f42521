//! # RPC Stress Library
//!
//! A bounded-concurrency load-generation engine. A benchmark run sends
//! exactly `request_count` requests through at most `concurrency` workers and
//! reports one aggregate: how many outcomes were processed, how many failed,
//! the summed and average latency, and an HDR latency distribution.
//!
//! ## Architecture Overview
//!
//! ```text
//!  RequestGenerator ─► Dispatcher ─► WorkerPool (Executor × concurrency) ─► Consumer
//!                                                                              │
//!                                          AggregateMetrics ◄──────────────────┘
//! ```
//!
//! - `dispatcher`: generates requests and feeds the shared request channel
//! - `worker`: executes requests concurrently and reports one outcome each
//! - `consumer`: folds exactly `request_count` outcomes into an aggregate
//! - `benchmark`: wires the three together for one run (`run_benchmark`)
//! - `executor`: the two seams callers plug their protocol into
//! - `rpc`: a JSON-RPC over HTTP generator and executor
//! - `results`: per-method report written as JSON
//!
//! The engine is protocol-agnostic: requests and responses are opaque to it.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rpc_stress::{run_benchmark, BenchmarkConfig, BenchmarkSpec};
//! use rpc_stress::rpc::{HttpExecutor, JsonRpcGenerator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let spec = BenchmarkSpec::new(
//!         BenchmarkConfig::new(1000, 100),
//!         JsonRpcGenerator::new("eth_blockNumber", serde_json::json!([])),
//!         HttpExecutor::new("http://127.0.0.1:8545")?,
//!     );
//!
//!     let metrics = run_benchmark(spec).await?;
//!     println!(
//!         "{} responses, {} failures, average {:?}",
//!         metrics.processed,
//!         metrics.failures,
//!         metrics.average_elapsed()
//!     );
//!     Ok(())
//! }
//! ```

/// Benchmark controller
///
/// `BenchmarkConfig`, `BenchmarkSpec`, and the `BenchmarkRunner` that wires a
/// dispatcher, a worker pool and a consumer together for one run.
pub mod benchmark;

/// Command-line interface and configuration
///
/// Argument parsing using clap, including human-readable durations
/// (e.g., "10s", "500ms") for the run deadline.
pub mod cli;

/// Outcome aggregation
///
/// Counts exactly `request_count` outcomes into an `AggregateMetrics`, or a
/// partial aggregate when the deadline or a shutdown ends the run.
pub mod consumer;

/// Request generation and fan-out
///
/// Calls the generator once per request and feeds the shared request channel.
pub mod dispatcher;

/// Engine error taxonomy
pub mod error;

/// Request generation and execution seams
pub mod executor;

/// Logging setup
///
/// Colorized console output plus an optional plain-text log file.
pub mod logging;

/// Latency collection and aggregate statistics
///
/// Outcomes are folded into exact sums and counts, plus an HDR histogram for
/// the latency distribution (P50, P95, P99, P99.9, etc.).
pub mod metrics;

/// Result collection and JSON report output
pub mod results;

/// JSON-RPC request generation and HTTP execution
pub mod rpc;

/// Cooperative cancellation signal shared by every pipeline task
pub mod shutdown;

/// Utility functions
///
/// - Duration, byte and request-rate formatting for log output
/// - Endpoint URL and concurrency validation
/// - Run ids and CPU information for reports
pub mod utils;

/// Worker pool
///
/// `concurrency` tasks sharing one request receiver, each sending one outcome
/// per executed request.
pub mod worker;

pub use benchmark::{run_benchmark, BenchmarkConfig, BenchmarkRunner, BenchmarkSpec};
pub use cli::Args;
pub use error::{BenchError, Result};
pub use executor::{Completion, Executor, FnExecutor, RequestGenerator};
pub use metrics::{AggregateMetrics, LatencySummary, Outcome, Termination};
pub use results::{MethodResult, ResultsManager, StressReport};
pub use shutdown::Shutdown;

/// The current version of the tool
///
/// Populated from Cargo.toml and written into every report.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Default number of requests sent per method
    pub const REQUEST_COUNT: u64 = 1000;

    /// Default number of requests in flight at once
    pub const CONCURRENCY: usize = 100;

    /// Upper bound on workers per run
    ///
    /// Also the capacity of the outcome channel, so it must stay well below
    /// tokio's semaphore permit limit.
    pub const MAX_CONCURRENCY: usize = 65_536;

    /// Default endpoint
    pub const URL: &str = "http://127.0.0.1:8545";

    /// Default output file name
    pub const OUTPUT_FILE: &str = "stress-result.json";

    /// Percentiles reported unless overridden
    pub const PERCENTILES: [f64; 4] = [50.0, 95.0, 99.0, 99.9];
}
