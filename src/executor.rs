//! # Request Generation and Execution Seams
//!
//! The engine never looks inside a request. Callers plug in two collaborators:
//!
//! - a [`RequestGenerator`], called once per dispatched request from a single task
//! - an [`Executor`], shared by every worker and called concurrently
//!
//! Any shared transport (an HTTP client, a connection pool) belongs inside the
//! executor. It must tolerate up to `concurrency` simultaneous callers; the
//! worker pool does not serialize access to it.

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;

/// Produces one opaque request per call
///
/// Implemented for every `FnMut() -> R` closure, so most callers never name
/// this trait. Panics are not caught: a panicking generator aborts the run
/// and the panic resurfaces on the caller of `run_benchmark`.
pub trait RequestGenerator<R>: Send + 'static {
    /// Build the next request
    fn generate(&mut self) -> R;
}

impl<R, F> RequestGenerator<R> for F
where
    F: FnMut() -> R + Send + 'static,
{
    fn generate(&mut self) -> R {
        self()
    }
}

/// What an executor reports about one finished request
///
/// `success == false` marks a protocol-level rejection (for example a non-200
/// status). Transport errors are reported by returning `Err` from
/// [`Executor::execute`] instead; the worker classifies both as failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub success: bool,
    pub status: Option<String>,
    pub size: Option<u64>,
}

impl Completion {
    /// A successful request with no payload size
    pub fn success() -> Self {
        Self {
            success: true,
            status: None,
            size: None,
        }
    }

    /// A request the endpoint answered but rejected
    pub fn failure(status: impl Into<String>) -> Self {
        Self {
            success: false,
            status: Some(status.into()),
            size: None,
        }
    }

    /// Attach the response payload size in bytes
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Performs one request
///
/// Must be safe to call from `concurrency` workers at once. There is no
/// per-request timeout in the engine; wrap the call in `tokio::time::timeout`
/// here if one is needed.
#[async_trait]
pub trait Executor<R>: Send + Sync + 'static {
    /// Execute a single request and report how it went
    async fn execute(&self, request: R) -> Result<Completion>;
}

/// Adapts an async closure into an [`Executor`]
///
/// ```rust
/// use rpc_stress::executor::{Completion, FnExecutor};
///
/// let executor = FnExecutor::new(|n: u64| async move {
///     if n % 2 == 0 {
///         Ok(Completion::success())
///     } else {
///         Ok(Completion::failure("odd"))
///     }
/// });
/// # let _ = executor;
/// ```
pub struct FnExecutor<F> {
    func: F,
}

impl<F> FnExecutor<F> {
    pub fn new<R, Fut>(func: F) -> Self
    where
        F: Fn(R) -> Fut,
        Fut: Future<Output = Result<Completion>>,
    {
        Self { func }
    }
}

#[async_trait]
impl<R, F, Fut> Executor<R> for FnExecutor<F>
where
    R: Send + 'static,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Completion>> + Send + 'static,
{
    async fn execute(&self, request: R) -> Result<Completion> {
        (self.func)(request).await
    }
}

impl<F> std::fmt::Debug for FnExecutor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}
