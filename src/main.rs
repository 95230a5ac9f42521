//! # RPC Stress - Main Entry Point
//!
//! Stress tests a JSON-RPC endpoint one method at a time.
//!
//! ## Flow
//!
//! 1. **Initialize logging**: colorized console output, optional log file
//! 2. **Parse arguments**: endpoint, methods, request count and concurrency
//! 3. **Run benchmarks**: one bounded-concurrency run per method
//! 4. **Write results**: a JSON report with one entry per method
//!
//! Ctrl-C stops the method in progress: no new requests are sent, requests
//! already in flight finish and are counted, and the report is still written.
//! A second Ctrl-C exits immediately.
//! Without `--continue-on-error`, the first method that fails aborts the
//! remaining ones.

use anyhow::{Context, Result};
use clap::Parser;
use rpc_stress::{
    benchmark::{BenchmarkConfig, BenchmarkRunner, BenchmarkSpec},
    cli::Args,
    results::ResultsManager,
    rpc::{HttpExecutor, JsonRpcGenerator},
    shutdown::Shutdown,
    utils::{format_request_rate, get_cpu_cores, validate_concurrency, validate_url},
};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG overrides the level picked by --verbose
    let _log_guard = rpc_stress::logging::init(args.verbose, args.log_file.as_deref())?;

    info!("Starting RPC Stress v{}", rpc_stress::VERSION);
    info!("Configuration: {:?}", args);

    validate_url(&args.url)?;
    validate_concurrency(args.concurrent)?;
    let config = BenchmarkConfig::from_args(&args)?;
    info!(
        "Using {} concurrent requests on {} CPU cores",
        config.concurrency,
        get_cpu_cores()
    );

    let executor = match args.timeout {
        Some(timeout) => {
            anyhow::ensure!(!timeout.is_zero(), "Request timeout must be greater than 0");
            HttpExecutor::with_timeout(&args.url, timeout)?
        }
        None => HttpExecutor::new(&args.url)?,
    };
    let executor = Arc::new(executor);
    let mut results_manager = ResultsManager::new(&args.output_file, &args.url, &config);

    let shutdown = Shutdown::new();
    spawn_ctrl_c_handler(shutdown.clone());

    for method in &args.methods {
        if shutdown.is_triggered() {
            warn!("Shutdown requested, skipping remaining methods");
            break;
        }

        match run_method(&config, method, &args, executor.clone(), &shutdown).await {
            Ok(metrics) => results_manager.add_result(method, &metrics),
            Err(e) => {
                error!("Benchmark failed for {}: {:#}", method, e);
                results_manager.add_failure(method, &e);
                if !args.continue_on_error {
                    results_manager.finalize()?;
                    return Err(e);
                }
            }
        }
    }

    results_manager.finalize()?;
    info!("RPC Stress completed");
    Ok(())
}

/// Stress a single JSON-RPC method
async fn run_method(
    config: &BenchmarkConfig,
    method: &str,
    args: &Args,
    executor: Arc<HttpExecutor>,
    shutdown: &Shutdown,
) -> Result<rpc_stress::AggregateMetrics> {
    let spec = BenchmarkSpec::with_shared_executor(
        config.clone(),
        JsonRpcGenerator::new(method, args.params.clone()),
        executor,
    );

    let started = std::time::Instant::now();
    let metrics = BenchmarkRunner::new(method)
        .with_shutdown(shutdown.clone())
        .run(spec)
        .await
        .with_context(|| format!("Stress run for {} did not finish", method))?;

    let wall_clock = started.elapsed().as_secs_f64();
    if wall_clock > 0.0 {
        info!(
            "{}: {}",
            method,
            format_request_rate(metrics.processed as f64 / wall_clock)
        );
    }
    Ok(metrics)
}

/// Trigger `shutdown` on the first Ctrl-C, exit on the second
fn spawn_ctrl_c_handler(shutdown: Shutdown) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        warn!("Ctrl-C received, stopping after in-flight requests (press again to exit now)");
        shutdown.trigger();

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Second Ctrl-C received, exiting without writing results");
            std::process::exit(130);
        }
    });
}
