//! # Utility Functions
//!
//! Formatting helpers for human-readable log output, input validation for
//! the command line, and a little system information for reports.
//!
//! ```rust
//! # fn main() -> anyhow::Result<()> {
//! use rpc_stress::utils::*;
//! use std::time::Duration;
//!
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
//! assert_eq!(format_request_rate(1500.0), "1.50K req/s");
//! validate_url("http://127.0.0.1:8545")?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use std::time::Duration;
use uuid::Uuid;

/// Generate a unique identifier for a stress run
///
/// Written into the report metadata so results from repeated runs against the
/// same endpoint can be told apart.
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Format a duration in a human-readable way
///
/// ## Unit Selection
///
/// - **Nanoseconds**: < 1,000 ns (e.g., "500ns")
/// - **Microseconds**: < 1,000,000 ns (e.g., "1.50μs")
/// - **Milliseconds**: < 1,000,000,000 ns (e.g., "25.75ms")
/// - **Seconds**: < 60 seconds (e.g., "5.25s")
/// - **Minutes and Hours**: compound form (e.g., "5m 30s", "2h 15m 30s")
///
/// ```rust
/// # use rpc_stress::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Format bytes in a human-readable way (binary, 1024-based)
///
/// ```rust
/// # use rpc_stress::utils::format_bytes;
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a request rate with K/M suffixes
pub fn format_request_rate(requests_per_second: f64) -> String {
    if requests_per_second < 1_000.0 {
        format!("{:.0} req/s", requests_per_second)
    } else if requests_per_second < 1_000_000.0 {
        format!("{:.2}K req/s", requests_per_second / 1_000.0)
    } else {
        format!("{:.2}M req/s", requests_per_second / 1_000_000.0)
    }
}

/// Validate that an endpoint URL is something the HTTP executor can post to
///
/// Only `http://` and `https://` endpoints with a host part are accepted.
pub fn validate_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| anyhow::anyhow!("URL {} must start with http:// or https://", url))?;
    if rest.is_empty() || rest.starts_with('/') {
        anyhow::bail!("URL {} has no host", url);
    }
    Ok(())
}

/// Validate the requested concurrency level
///
/// Zero and values above [`crate::defaults::MAX_CONCURRENCY`] are rejected.
/// Values above the request count are allowed; the extra workers simply find
/// nothing to do.
pub fn validate_concurrency(concurrency: usize) -> Result<()> {
    if concurrency == 0 {
        anyhow::bail!("Concurrency cannot be zero");
    }
    if concurrency > crate::defaults::MAX_CONCURRENCY {
        anyhow::bail!(
            "Concurrency {} exceeds the maximum of {}",
            concurrency,
            crate::defaults::MAX_CONCURRENCY
        );
    }
    Ok(())
}

/// Number of logical CPU cores available to the process
pub fn get_cpu_cores() -> usize {
    num_cpus::get()
}
