use crate::{
    benchmark::BenchmarkConfig,
    metrics::{AggregateMetrics, Termination},
    utils::{format_duration, generate_run_id},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-method outcome of one stress run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: String,
    /// Human-readable mean latency, `"n/a"` when nothing was processed
    pub average: String,
    pub average_ns: Option<u64>,
    pub responses: u64,
    pub failures: u64,
    pub total_bytes: u64,
    pub p95_ns: Option<u64>,
    pub p99_ns: Option<u64>,
    pub termination: Termination,
}

impl MethodResult {
    pub fn from_metrics(method: impl Into<String>, metrics: &AggregateMetrics) -> Self {
        let average = metrics.average_elapsed();
        let percentile = |p: f64| metrics.latency.as_ref().and_then(|l| l.percentile(p));

        Self {
            method: method.into(),
            average: average
                .map(format_duration)
                .unwrap_or_else(|| "n/a".to_string()),
            average_ns: average.map(|d| d.as_nanos() as u64),
            responses: metrics.processed,
            failures: metrics.failures,
            total_bytes: metrics.total_size,
            p95_ns: percentile(95.0),
            p99_ns: percentile(99.0),
            termination: metrics.termination,
        }
    }
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub tool_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            tool_version: crate::VERSION.to_string(),
        }
    }
}

/// Run metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub request_count: u64,
    pub concurrency: usize,
    pub system_info: SystemInfo,
}

/// The JSON document written at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressReport {
    pub metadata: ReportMetadata,
    pub endpoint: String,
    pub methods: BTreeMap<String, MethodResult>,
    /// Methods whose benchmark failed outright, with the error message
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_methods: BTreeMap<String, String>,
}

/// Collects per-method results and writes the final report
pub struct ResultsManager {
    output_file: PathBuf,
    endpoint: String,
    run_id: String,
    request_count: u64,
    concurrency: usize,
    methods: BTreeMap<String, MethodResult>,
    failed_methods: BTreeMap<String, String>,
}

impl ResultsManager {
    /// Create a new results manager
    pub fn new(output_file: &Path, endpoint: impl Into<String>, config: &BenchmarkConfig) -> Self {
        Self {
            output_file: output_file.to_path_buf(),
            endpoint: endpoint.into(),
            run_id: generate_run_id(),
            request_count: config.request_count,
            concurrency: config.concurrency,
            methods: BTreeMap::new(),
            failed_methods: BTreeMap::new(),
        }
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Record the aggregate of one method's run
    ///
    /// Benchmarking the same method twice keeps the later result.
    pub fn add_result(&mut self, method: &str, metrics: &AggregateMetrics) {
        let result = MethodResult::from_metrics(method, metrics);
        info!(
            "{}: {} responses, {} failures, average {}",
            method, result.responses, result.failures, result.average
        );
        if !metrics.is_complete() {
            warn!(method, termination = %metrics.termination, "Partial result recorded");
        }
        self.failed_methods.remove(method);
        if self.methods.insert(method.to_string(), result).is_some() {
            debug!(method, "Replaced earlier result");
        }
    }

    /// Record a method whose benchmark could not produce a result
    pub fn add_failure(&mut self, method: &str, error: &anyhow::Error) {
        self.failed_methods
            .insert(method.to_string(), format!("{:#}", error));
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Assemble the report from everything recorded so far
    pub fn report(&self) -> StressReport {
        StressReport {
            metadata: ReportMetadata {
                run_id: self.run_id.clone(),
                timestamp: chrono::Utc::now(),
                request_count: self.request_count,
                concurrency: self.concurrency,
                system_info: SystemInfo::default(),
            },
            endpoint: self.endpoint.clone(),
            methods: self.methods.clone(),
            failed_methods: self.failed_methods.clone(),
        }
    }

    /// Finalize results and write to output file
    pub fn finalize(&self) -> Result<StressReport> {
        info!("Finalizing stress results");

        let report = self.report();
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&self.output_file, json)
            .with_context(|| format!("Failed to write results to {:?}", self.output_file))?;

        info!("Results written to: {:?}", self.output_file);
        Ok(report)
    }
}
