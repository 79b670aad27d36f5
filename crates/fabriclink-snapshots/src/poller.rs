//! Long-running operation polling
//!
//! Create requests answered with `202 Accepted` hand back a `Location` URL.
//! The poller GETs it until the operation reaches a terminal state:
//!
//! | response | action |
//! |---|---|
//! | 201 | done, GET `{url}/result` |
//! | 200 `Succeeded` | GET `{url}/result`, fall back to the status payload |
//! | 200 `Failed` | error with the service's code and message |
//! | 200 other | sleep, poll again |
//! | 202 | sleep, poll again |
//! | anything else | HTTP error |

use crate::error::ControlPlaneError;
use crate::transport::{ApiRequest, HttpTransport};
use fabriclink_core::Sleeper;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default poll attempts
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default delay between polls
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(30);

/// Status reported by the operation endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    /// Transient, not terminal
    Undefined,
    /// Any status this client does not know; treated as transient
    Unknown(String),
}

impl OperationStatus {
    /// Case-insensitive parse
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "notstarted" => Self::NotStarted,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "undefined" => Self::Undefined,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::NotStarted | Self::Undefined | Self::Unknown(_) => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("notstarted"),
            Self::Running => f.write_str("running"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Undefined => f.write_str("undefined"),
            Self::Unknown(s) => f.write_str(s),
        }
    }
}

/// An accepted asynchronous operation
#[derive(Debug, Clone, PartialEq)]
pub struct LongRunningOperation {
    pub id: String,
    pub location: String,
    pub status: OperationStatus,
    pub result: Option<Value>,
}

impl LongRunningOperation {
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
            status: OperationStatus::NotStarted,
            result: None,
        }
    }

    /// Record an observed status; statuses never move backwards
    pub fn observe(&mut self, status: OperationStatus) {
        if self.status.is_terminal() {
            return;
        }
        if status.rank() >= self.status.rank() {
            self.status = status;
        }
    }

    fn result_url(&self) -> String {
        format!("{}/result", self.location)
    }
}

enum Step {
    Done(Value),
    Wait,
}

/// Polls an operation URL until done
pub struct OperationPoller {
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
    max_retries: u32,
}

impl OperationPoller {
    pub fn new(transport: Arc<dyn HttpTransport>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            transport,
            sleeper,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Poll `url` until the operation is done, sleeping `delay` between polls
    pub fn poll_until_done(
        &self,
        url: &str,
        operation_id: &str,
        delay: Duration,
    ) -> Result<Value, ControlPlaneError> {
        let mut operation = LongRunningOperation::new(operation_id, url);

        self.poll(&mut operation, delay).map_err(|e| {
            error!(operation_id, error = %e, "Failed to poll operation");
            e
        })
    }

    /// Poll an operation handle, recording its status
    pub fn poll(
        &self,
        operation: &mut LongRunningOperation,
        delay: Duration,
    ) -> Result<Value, ControlPlaneError> {
        for attempt in 1..=self.max_retries {
            debug!(
                operation_id = %operation.id,
                attempt,
                max_retries = self.max_retries,
                "Polling operation"
            );

            match self.step(operation)? {
                Step::Done(value) => {
                    operation.result = Some(value.clone());
                    return Ok(value);
                }
                Step::Wait => self.sleeper.sleep(delay),
            }
        }

        Err(ControlPlaneError::OperationTimeout {
            operation_id: operation.id.clone(),
            attempts: self.max_retries,
        })
    }

    fn step(&self, operation: &mut LongRunningOperation) -> Result<Step, ControlPlaneError> {
        let response = self.transport.send(&ApiRequest::get(&operation.location))?;
        let id = operation.id.clone();

        match response.status {
            201 => {
                debug!(operation_id = %id, "Operation completed (201)");
                operation.observe(OperationStatus::Succeeded);
                let result = self
                    .transport
                    .send(&ApiRequest::get(operation.result_url()))?
                    .error_for_status()?
                    .json()?;
                Ok(Step::Done(result))
            }
            200 => {
                let payload = response.json()?;
                let status = OperationStatus::parse(
                    payload.get("status").and_then(Value::as_str).unwrap_or(""),
                );
                operation.observe(status.clone());

                match status {
                    OperationStatus::Succeeded => {
                        info!(operation_id = %id, "Operation succeeded");
                        Ok(Step::Done(self.fetch_result_or(operation, payload)))
                    }
                    OperationStatus::Failed => {
                        let error = payload.get("error");
                        let field = |name: &str, default: &str| {
                            error
                                .and_then(|e| e.get(name))
                                .and_then(Value::as_str)
                                .unwrap_or(default)
                                .to_string()
                        };
                        Err(ControlPlaneError::OperationFailed {
                            operation_id: id,
                            code: field("code", "Unknown"),
                            message: field("message", "Unknown error"),
                        })
                    }
                    OperationStatus::Running | OperationStatus::NotStarted => {
                        info!(operation_id = %id, status = %status, "Operation in progress");
                        Ok(Step::Wait)
                    }
                    OperationStatus::Undefined => {
                        warn!(operation_id = %id, "Operation status is undefined, continuing to poll");
                        Ok(Step::Wait)
                    }
                    OperationStatus::Unknown(other) => {
                        warn!(operation_id = %id, status = %other, "Unknown operation status");
                        Ok(Step::Wait)
                    }
                }
            }
            202 => {
                info!(operation_id = %id, "Operation still in progress (202)");
                Ok(Step::Wait)
            }
            _ => Err(response
                .error_for_status()
                .err()
                .unwrap_or_else(|| ControlPlaneError::InvalidResponse(format!(
                    "unexpected status while polling operation {}",
                    id
                )))),
        }
    }

    /// `/result` body when it answers 200, otherwise the status payload
    fn fetch_result_or(&self, operation: &LongRunningOperation, status_payload: Value) -> Value {
        match self.transport.send(&ApiRequest::get(operation.result_url())) {
            Ok(response) if response.status == 200 => response.json().unwrap_or(status_payload),
            Ok(response) => {
                debug!(
                    operation_id = %operation.id,
                    status = response.status,
                    "Result endpoint unavailable, using status payload"
                );
                status_payload
            }
            Err(e) => {
                debug!(operation_id = %operation.id, error = %e, "Result request failed");
                status_payload
            }
        }
    }
}
