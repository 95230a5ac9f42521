use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// RPC Stress - fire a fixed number of JSON-RPC requests at an endpoint with bounded concurrency
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// JSON-RPC endpoint to stress
    #[clap(long, default_value = crate::defaults::URL, help_heading = "Core Options")]
    pub url: String,

    /// JSON-RPC methods to benchmark, one run each (space-separated)
    #[clap(short = 'm', long = "method", required = true, num_args = 1.., help_heading = "Core Options")]
    pub methods: Vec<String>,

    /// Number of requests to send to every method
    #[clap(short = 'r', long, default_value_t = crate::defaults::REQUEST_COUNT)]
    pub requests: u64,

    /// Number of requests in flight at the same time
    #[clap(short = 'c', long, default_value_t = crate::defaults::CONCURRENCY)]
    pub concurrent: usize,

    /// JSON array used as `params` for every request
    #[clap(long, value_parser = parse_params, default_value = "[]")]
    pub params: serde_json::Value,

    /// Output file for results (JSON format)
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_FILE)]
    pub output_file: PathBuf,

    /// Give up on a method after this long and report what finished (e.g. "30s", "2m")
    #[clap(short = 'd', long, value_parser = parse_duration)]
    pub deadline: Option<Duration>,

    /// Fail any single request that takes longer than this (e.g. "5s", "750ms")
    #[clap(short = 't', long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Percentiles to calculate for latency metrics
    #[clap(long, default_values_t = crate::defaults::PERCENTILES.to_vec())]
    pub percentiles: Vec<f64>,

    /// Continue with the remaining methods even if one fails
    #[clap(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,

    /// Also write logs to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            url: crate::defaults::URL.to_string(),
            methods: Vec::new(),
            requests: crate::defaults::REQUEST_COUNT,
            concurrent: crate::defaults::CONCURRENCY,
            params: serde_json::Value::Array(Vec::new()),
            output_file: PathBuf::from(crate::defaults::OUTPUT_FILE),
            deadline: None,
            timeout: None,
            percentiles: crate::defaults::PERCENTILES.to_vec(),
            continue_on_error: false,
            verbose: false,
            log_file: None,
        }
    }
}

/// Parse the `--params` value; JSON-RPC positional params must be an array
fn parse_params(s: &str) -> Result<serde_json::Value, String> {
    let value: serde_json::Value =
        serde_json::from_str(s).map_err(|e| format!("Invalid JSON in params: {}", e))?;
    if !value.is_array() {
        return Err("params must be a JSON array".to_string());
    }
    Ok(value)
}

/// Parse duration from string (e.g., "10s", "5m", "1h", "500ms")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if num < 0.0 {
        return Err(format!("Duration cannot be negative: {}", s));
    }

    let duration = match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs_f64(num),
        "m" => Duration::from_secs_f64(num * 60.0),
        "h" => Duration::from_secs_f64(num * 3600.0),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}
