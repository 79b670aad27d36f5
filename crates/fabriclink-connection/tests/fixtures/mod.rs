//! Test fixtures for connection manager integration tests
//!
//! Builds managers over mock drivers and a scripted control plane so the
//! whole open/execute/release path runs without a warehouse.

// Shared by several test binaries; each uses a subset.
#![allow(dead_code)]

use fabriclink_auth::TokenAuthenticator;
use fabriclink_connection::{ConnectionError, ConnectionManager, ControlPlaneConnector, RunLifecycle};
use fabriclink_core::{Credentials, DriverPreference, RecordingSleeper};
use fabriclink_driver::{BackendKind, BackendResolver, DriverRegistry, MockDriver};
use fabriclink_snapshots::{ControlPlaneClient, ScriptedTransport, SnapshotOrchestrator};
use serde_json::{json, Value};
use std::sync::Arc;

pub const APP_NAME: &str = "fabriclink/test";

/// A service-principal profile pinned to one backend
pub fn service_principal(backend: DriverPreference) -> Credentials {
    let mut creds = Credentials::new("abc.datawarehouse.fabric.microsoft.com", "sales", "dbo");
    creds.driver_backend = backend;
    creds.tenant_id = Some("tenant".to_string());
    creds.client_id = Some("app-id".to_string());
    creds.client_secret = Some("sp-secret".to_string());
    creds.login_timeout = 15;
    creds.query_timeout = 60;
    creds
}

/// Manager over a registry holding both drivers, with sleeps recorded
pub struct Harness {
    pub manager: ConnectionManager,
    pub native: MockDriver,
    pub odbc: MockDriver,
    pub sleeper: Arc<RecordingSleeper>,
}

pub fn harness(creds: Credentials, native: MockDriver, odbc: MockDriver) -> Harness {
    let registry = DriverRegistry::new()
        .with_driver(BackendKind::Native, Arc::new(native.clone()))
        .with_driver(BackendKind::Odbc, Arc::new(odbc.clone()));
    let sleeper = Arc::new(RecordingSleeper::new());

    let manager = ConnectionManager::new(
        creds,
        Arc::new(BackendResolver::new(registry)),
        Arc::new(TokenAuthenticator::empty()),
    )
    .with_sleeper(sleeper.clone())
    .with_application_name(APP_NAME);

    Harness {
        manager,
        native,
        odbc,
        sleeper,
    }
}

/// Harness on the native backend with fresh mock drivers
pub fn native_harness(native: MockDriver) -> Harness {
    harness(
        service_principal(DriverPreference::Native),
        native,
        MockDriver::new("odbc"),
    )
}

/// Connector replaying a scripted control plane
pub struct ScriptedControlPlane {
    pub transport: ScriptedTransport,
    pub sleeper: Arc<RecordingSleeper>,
}

impl ControlPlaneConnector for ScriptedControlPlane {
    fn connect(
        &self,
        credentials: &Credentials,
        workspace_id: &str,
    ) -> Result<SnapshotOrchestrator, ConnectionError> {
        Ok(SnapshotOrchestrator::new(ControlPlaneClient::from_credentials(
            credentials,
            Arc::new(self.transport.clone()),
            self.sleeper.clone(),
            workspace_id,
        )))
    }
}

/// Lifecycle for `command` backed by `transport`
pub fn lifecycle(command: &str, transport: &ScriptedTransport) -> Arc<RunLifecycle> {
    Arc::new(RunLifecycle::new(
        Some(command.to_string()),
        Arc::new(ScriptedControlPlane {
            transport: transport.clone(),
            sleeper: Arc::new(RecordingSleeper::new()),
        }),
    ))
}

pub fn warehouses() -> Value {
    json!({"value": [{"id": "wh-1", "displayName": "sales", "type": "Warehouse"}]})
}

pub fn existing_snapshot() -> Value {
    json!({"value": [
        {"id": "snap-1", "displayName": "nightly", "type": "WarehouseSnapshot",
         "properties": {"parentWarehouseId": "wh-1"}},
    ]})
}

pub fn updated_snapshot() -> Value {
    json!({"id": "snap-1", "displayName": "nightly",
           "properties": {"parentWarehouseId": "wh-1"}})
}
