// ABOUTME: Sibling function invoker used for audit writes, deploy triggers and DNS provisioning
// ABOUTME: HTTP implementation supports fire-and-forget and wait-for-result modes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};

/// Request timeout for sibling function calls
const INVOKE_TIMEOUT: Duration = Duration::from_secs(30);
/// Connection timeout for sibling function calls
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How the caller waits on an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Dispatch and return immediately; failures are logged, never returned
    FireAndForget,
    /// Await the function and propagate its failure
    WaitForResult,
}

/// Invokes sibling functions by name
#[async_trait]
pub trait TaskInvoker: Send + Sync {
    /// Invoke `function` with `payload`.
    ///
    /// Returns `None` in fire-and-forget mode and the function's JSON result
    /// when waiting.
    ///
    /// # Errors
    ///
    /// Only in `WaitForResult` mode: `ExternalServiceError` when the function
    /// cannot be reached or reports failure
    async fn invoke(
        &self,
        function: &str,
        payload: Value,
        mode: InvocationMode,
    ) -> AppResult<Option<Value>>;

    /// Wait for every fire-and-forget invocation still in flight
    async fn drain(&self) {}
}

/// POSTs JSON payloads to `<base_url>/<function>`
///
/// Fire-and-forget requests run on tracked tasks so a short-lived process
/// can [`drain`](TaskInvoker::drain) them before exiting.
#[derive(Debug, Clone)]
pub struct HttpTaskInvoker {
    client: Client,
    base_url: String,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl HttpTaskInvoker {
    /// Invoker for functions served under `base_url`
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>) -> AppResult<Self> {
        let client = ClientBuilder::new()
            .timeout(INVOKE_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                AppError::internal(format!("Failed to build HTTP client: {e}")).with_source(e)
            })?;
        Ok(Self::with_client(client, base_url))
    }

    /// Invoker using a preconfigured client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Number of fire-and-forget requests not yet reaped
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn function_url(&self, function: &str) -> String {
        format!("{}/{function}", self.base_url)
    }

    async fn call(client: &Client, url: &str, function: &str, payload: &Value) -> AppResult<Value> {
        let response = client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::external_service(function, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::external_service(function, e.to_string()))?;

        if !status.is_success() {
            return Err(AppError::external_service(
                function,
                format!("returned {status}: {body}"),
            ));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            AppError::external_service(function, format!("returned invalid JSON: {e}"))
        })
    }
}

#[async_trait]
impl TaskInvoker for HttpTaskInvoker {
    async fn invoke(
        &self,
        function: &str,
        payload: Value,
        mode: InvocationMode,
    ) -> AppResult<Option<Value>> {
        let url = self.function_url(function);
        match mode {
            InvocationMode::FireAndForget => {
                let client = self.client.clone();
                let function = function.to_owned();
                {
                    let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                    // reap finished requests
                    while in_flight.try_join_next().is_some() {}
                    in_flight.spawn(async move {
                        match Self::call(&client, &url, &function, &payload).await {
                            Ok(_) => debug!(function = %function, "Fire-and-forget invocation delivered"),
                            Err(e) => warn!(function = %function, error = %e, "Fire-and-forget invocation failed"),
                        }
                    });
                }
                Ok(None)
            }
            InvocationMode::WaitForResult => {
                let result = Self::call(&self.client, &url, function, &payload).await?;
                debug!(function, "Invocation completed");
                Ok(Some(result))
            }
        }
    }

    async fn drain(&self) {
        let mut pending = std::mem::take(
            &mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let count = pending.len();
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Fire-and-forget invocation task failed");
            }
        }
        if count > 0 {
            debug!(count, "Fire-and-forget invocations drained");
        }
    }
}

/// Logs invocations without calling anything; used when no invoke URL is set
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInvoker;

#[async_trait]
impl TaskInvoker for LoggingInvoker {
    async fn invoke(
        &self,
        function: &str,
        payload: Value,
        mode: InvocationMode,
    ) -> AppResult<Option<Value>> {
        info!(function, ?mode, %payload, "Sibling invocation (log only)");
        Ok(match mode {
            InvocationMode::FireAndForget => None,
            InvocationMode::WaitForResult => Some(Value::Null),
        })
    }
}
