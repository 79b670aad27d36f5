//! REST control-plane client for warehouses and warehouse snapshots

use crate::error::ControlPlaneError;
use crate::poller::{OperationPoller, DEFAULT_MAX_RETRIES, DEFAULT_POLL_DELAY};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use chrono::Utc;
use fabriclink_core::{Credentials, Sleeper, DEFAULT_API_URL};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const WAREHOUSE_TYPE: &str = "Warehouse";
const SNAPSHOT_TYPE: &str = "WarehouseSnapshot";

/// How a snapshot came to be current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
        }
    }
}

/// Normalized outcome of a create or update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    /// Absent only when an asynchronous create reported no resource id
    pub snapshot_id: Option<String>,
    pub display_name: Option<String>,
    pub warehouse_id: Option<String>,
    pub operation_type: OperationType,
    pub operation: Value,
}

/// Current UTC time in the format the control plane expects
pub fn snapshot_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn str_field(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

/// Warehouse and snapshot operations for one workspace
pub struct ControlPlaneClient {
    transport: Arc<dyn HttpTransport>,
    poller: OperationPoller,
    base_url: String,
    workspace_id: String,
    poll_delay: Duration,
}

impl ControlPlaneClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
        workspace_id: impl Into<String>,
    ) -> Self {
        Self {
            poller: OperationPoller::new(Arc::clone(&transport), sleeper),
            transport,
            base_url: DEFAULT_API_URL.to_string(),
            workspace_id: workspace_id.into(),
            poll_delay: DEFAULT_POLL_DELAY,
        }
    }

    /// Client configured from a profile's API URL and poll settings
    pub fn from_credentials(
        credentials: &Credentials,
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
        workspace_id: impl Into<String>,
    ) -> Self {
        Self::new(transport, sleeper, workspace_id)
            .with_base_url(credentials.api_url.clone())
            .with_polling(credentials.snapshot_poll_max_retries, credentials.snapshot_poll_delay())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_polling(mut self, max_retries: u32, delay: Duration) -> Self {
        self.poller = self.poller.with_max_retries(max_retries);
        self.poll_delay = delay;
        self
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    fn workspace_url(&self, path: &str) -> String {
        format!("{}/workspaces/{}/{}", self.base_url, self.workspace_id, path)
    }

    fn send(&self, request: ApiRequest, what: &str) -> Result<ApiResponse, ControlPlaneError> {
        self.transport.send(&request).map_err(|e| {
            error!(error = %e, "Failed to {}", what);
            e
        })
    }

    fn list(&self, path: &str, what: &str) -> Result<Vec<Value>, ControlPlaneError> {
        let response = self
            .send(ApiRequest::get(self.workspace_url(path)), what)?
            .error_for_status()
            .map_err(|e| {
                error!(error = %e, "Failed to {}", what);
                e
            })?;

        let items = match response.json()?.get_mut("value").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        debug!(count = items.len(), workspace_id = %self.workspace_id, "Listed {}", path);
        Ok(items)
    }

    /// `GET /workspaces/{id}/warehouses`
    pub fn list_warehouses(&self) -> Result<Vec<Value>, ControlPlaneError> {
        self.list("warehouses", "list warehouses")
    }

    /// `GET /workspaces/{id}/warehousesnapshots`
    pub fn list_snapshots(&self) -> Result<Vec<Value>, ControlPlaneError> {
        self.list("warehousesnapshots", "list warehouse snapshots")
    }

    /// Id of the warehouse with this display name
    pub fn find_warehouse_id(warehouses: &[Value], name: &str) -> Option<String> {
        warehouses
            .iter()
            .find(|w| {
                w.get("displayName").and_then(Value::as_str) == Some(name)
                    && w.get("type").and_then(Value::as_str) == Some(WAREHOUSE_TYPE)
            })
            .and_then(|w| str_field(w, "/id"))
    }

    /// Id of the snapshot of `warehouse_id` with this display name
    pub fn find_snapshot_id(snapshots: &[Value], warehouse_id: &str, name: &str) -> Option<String> {
        let found = snapshots
            .iter()
            .find(|s| {
                s.pointer("/properties/parentWarehouseId").and_then(Value::as_str)
                    == Some(warehouse_id)
                    && s.get("displayName").and_then(Value::as_str) == Some(name)
                    && s.get("type").and_then(Value::as_str) == Some(SNAPSHOT_TYPE)
            })
            .and_then(|s| str_field(s, "/id"));

        match &found {
            Some(id) => info!(snapshot = name, snapshot_id = %id, "Found existing snapshot"),
            None => info!(snapshot = name, warehouse_id, "No existing snapshot"),
        }
        found
    }

    /// `POST /workspaces/{id}/warehousesnapshots`
    pub fn create_snapshot(
        &self,
        warehouse_id: &str,
        snapshot_name: &str,
    ) -> Result<SnapshotRecord, ControlPlaneError> {
        let now = snapshot_timestamp();
        let payload = json!({
            "displayName": snapshot_name,
            "description": format!("Warehouse snapshot created at {}", now),
            "creationPayload": {
                "parentWarehouseId": warehouse_id,
                "snapshotDateTime": now,
            },
        });

        let what = format!("create warehouse snapshot '{}'", snapshot_name);
        let response = self.send(
            ApiRequest::post(self.workspace_url("warehousesnapshots"), payload),
            &what,
        )?;

        let result = match response.status {
            201 => {
                let body = response.json()?;
                let snapshot_id = str_field(&body, "/id");
                info!(snapshot = snapshot_name, snapshot_id = ?snapshot_id, "Created snapshot");
                Ok(SnapshotRecord {
                    snapshot_id,
                    display_name: str_field(&body, "/displayName")
                        .or_else(|| Some(snapshot_name.to_string())),
                    warehouse_id: Some(warehouse_id.to_string()),
                    operation_type: OperationType::Create,
                    operation: body,
                })
            }
            202 => self.await_create(&response, warehouse_id, snapshot_name),
            _ => Err(response.error_for_status().err().unwrap_or_else(|| {
                ControlPlaneError::InvalidResponse(format!(
                    "Unexpected response status while creating snapshot '{}'",
                    snapshot_name
                ))
            })),
        };

        result.map_err(|e| {
            error!(error = %e, "Failed to {}", what);
            e
        })
    }

    fn await_create(
        &self,
        accepted: &ApiResponse,
        warehouse_id: &str,
        snapshot_name: &str,
    ) -> Result<SnapshotRecord, ControlPlaneError> {
        let location = accepted
            .header("Location")
            .filter(|l| !l.is_empty())
            .ok_or(ControlPlaneError::MissingLocation)?;
        let operation_id = accepted.header("x-ms-operation-id").unwrap_or("unknown");
        let delay = accepted
            .header("Retry-After")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.poll_delay);

        info!(
            operation_id,
            retry_after_secs = delay.as_secs(),
            "Snapshot creation accepted"
        );

        let result = self.poller.poll_until_done(location, operation_id, delay)?;
        let snapshot_id = str_field(&result, "/resourceId")
            .or_else(|| str_field(&result, "/result/id"))
            .or_else(|| str_field(&result, "/id"));

        if let Some(id) = &snapshot_id {
            info!(snapshot = snapshot_name, snapshot_id = %id, "Created snapshot");
        }

        Ok(SnapshotRecord {
            snapshot_id,
            display_name: Some(snapshot_name.to_string()),
            warehouse_id: Some(warehouse_id.to_string()),
            operation_type: OperationType::Create,
            operation: result,
        })
    }

    /// `PATCH /workspaces/{id}/warehousesnapshots/{snapshot_id}` with a fresh timestamp
    pub fn update_snapshot(&self, snapshot_id: &str) -> Result<SnapshotRecord, ControlPlaneError> {
        let now = snapshot_timestamp();
        let payload = json!({
            "description": format!("Warehouse snapshot updated at {}", now),
            "properties": { "snapshotDateTime": now },
        });

        let what = format!("update warehouse snapshot '{}'", snapshot_id);
        let url = self.workspace_url(&format!("warehousesnapshots/{}", snapshot_id));
        let result = self
            .send(ApiRequest::patch(url, payload), &what)?
            .error_for_status()
            .and_then(|response| response.json())
            .map_err(|e| {
                error!(error = %e, "Failed to {}", what);
                e
            })?;

        info!(snapshot_id, "Updated snapshot");
        Ok(SnapshotRecord {
            snapshot_id: str_field(&result, "/id").or_else(|| Some(snapshot_id.to_string())),
            display_name: str_field(&result, "/displayName"),
            warehouse_id: str_field(&result, "/properties/parentWarehouseId"),
            operation_type: OperationType::Update,
            operation: result,
        })
    }
}

impl fmt::Debug for ControlPlaneClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlaneClient")
            .field("base_url", &self.base_url)
            .field("workspace_id", &self.workspace_id)
            .field("max_retries", &self.poller.max_retries())
            .field("poll_delay", &self.poll_delay)
            .finish()
    }
}
