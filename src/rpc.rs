//! # JSON-RPC over HTTP
//!
//! The concrete generator/executor pair behind the `rpc-stress` binary.
//! [`JsonRpcGenerator`] captures a method name and its params once and builds
//! a fresh [`JsonRpcRequest`] per call. [`HttpExecutor`] posts each request
//! as a JSON body on one shared `reqwest::Client`.
//!
//! Classification follows plain HTTP: a `200 OK` is a success whatever the
//! JSON-RPC payload says; any other status is a failure carrying the status
//! text; connection and body read errors surface as `Err`.

use crate::executor::{Completion, Executor, RequestGenerator};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// JSON-RPC protocol version sent with every request
pub const JSONRPC_VERSION: &str = "2.0";

/// Request id used for every request of a run
///
/// Responses are never matched back to requests, so one id is enough.
pub const REQUEST_ID: &str = "1";

/// One JSON-RPC 2.0 call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub id: String,
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: REQUEST_ID.to_string(),
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Builds the same call over and over
#[derive(Debug, Clone)]
pub struct JsonRpcGenerator {
    method: String,
    params: serde_json::Value,
}

impl JsonRpcGenerator {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl RequestGenerator<JsonRpcRequest> for JsonRpcGenerator {
    fn generate(&mut self) -> JsonRpcRequest {
        JsonRpcRequest::new(self.method.clone(), self.params.clone())
    }
}

/// Posts JSON-RPC requests to a single endpoint
///
/// `reqwest::Client` pools connections internally and is safe to share
/// between every worker of the pool.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    url: String,
}

impl HttpExecutor {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::build(url.into(), None)
    }

    /// Fail any request that takes longer than `timeout`
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::build(url.into(), Some(timeout))
    }

    fn build(url: String, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Executor<JsonRpcRequest> for HttpExecutor {
    async fn execute(&self, request: JsonRpcRequest) -> Result<Completion> {
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("{} request to {} failed", request.method, self.url))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read {} response body", request.method))?;
        let size = body.len() as u64;
        trace!(method = %request.method, %status, size, "Response received");

        let completion = if status == StatusCode::OK {
            Completion::success()
        } else {
            Completion::failure(status.to_string())
        };
        Ok(completion.with_size(size))
    }
}
