//! Integration tests for snapshot orchestration
//!
//! The control plane is replaced by `ScriptedTransport`; sleeps are recorded,
//! not taken.
//!
//! ```bash
//! cargo test -p fabriclink-snapshots --test integration_tests
//! ```

use fabriclink_core::{Credentials, RecordingSleeper};
use fabriclink_snapshots::{
    ApiResponse, ControlPlaneClient, ControlPlaneError, HttpMethod, OperationType,
    ScriptedTransport, SnapshotOrchestrator,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const BASE: &str = "https://api.fabric.microsoft.com/v1";
const LOCATION: &str = "https://api.fabric.microsoft.com/v1/operations/op-42";

// =============================================================================
// Helpers
// =============================================================================

fn warehouses() -> Value {
    json!({"value": [
        {"id": "wh-1", "displayName": "sales", "type": "Warehouse"},
        {"id": "ep-1", "displayName": "sales", "type": "SQLEndpoint"},
    ]})
}

fn snapshots_with_existing() -> Value {
    json!({"value": [
        {"id": "snap-1", "displayName": "nightly", "type": "WarehouseSnapshot",
         "properties": {"parentWarehouseId": "wh-1"}},
    ]})
}

fn updated() -> Value {
    json!({"id": "snap-1", "displayName": "nightly",
           "properties": {"parentWarehouseId": "wh-1"}})
}

fn orchestrator(transport: &ScriptedTransport, sleeper: &Arc<RecordingSleeper>) -> SnapshotOrchestrator {
    let creds = Credentials::new("host", "sales", "dbo").with_snapshot("ws-1", "nightly");
    SnapshotOrchestrator::new(ControlPlaneClient::from_credentials(
        &creds,
        Arc::new(transport.clone()),
        sleeper.clone(),
        "ws-1",
    ))
}

fn methods(transport: &ScriptedTransport) -> Vec<HttpMethod> {
    transport.requests().iter().map(|r| r.method).collect()
}

// =============================================================================
// Orchestration
// =============================================================================

#[test]
fn test_existing_snapshot_is_updated() {
    let transport = ScriptedTransport::new()
        .respond_json(200, warehouses())
        .respond_json(200, snapshots_with_existing())
        .respond_json(200, updated());
    let sleeper = Arc::new(RecordingSleeper::new());

    let record = orchestrator(&transport, &sleeper)
        .orchestrate("sales", "nightly")
        .unwrap();

    assert_eq!(record.operation_type, OperationType::Update);
    assert_eq!(record.snapshot_id.as_deref(), Some("snap-1"));
    assert_eq!(record.warehouse_id.as_deref(), Some("wh-1"));
    assert_eq!(
        methods(&transport),
        vec![HttpMethod::Get, HttpMethod::Get, HttpMethod::Patch]
    );
}

#[test]
fn test_orchestrating_twice_never_creates() {
    let mut transport = ScriptedTransport::new();
    for _ in 0..2 {
        transport = transport
            .respond_json(200, warehouses())
            .respond_json(200, snapshots_with_existing())
            .respond_json(200, updated());
    }
    let sleeper = Arc::new(RecordingSleeper::new());
    let orchestrator = orchestrator(&transport, &sleeper);

    let first = orchestrator.orchestrate("sales", "nightly").unwrap();
    let second = orchestrator.orchestrate("sales", "nightly").unwrap();

    assert_eq!(first.operation_type, OperationType::Update);
    assert_eq!(second.operation_type, OperationType::Update);
    assert!(!methods(&transport).contains(&HttpMethod::Post));
}

#[test]
fn test_missing_snapshot_is_created_synchronously() {
    let transport = ScriptedTransport::new()
        .respond_json(200, warehouses())
        .respond_json(200, json!({"value": []}))
        .respond_json(201, json!({"id": "snap-9", "displayName": "nightly"}));
    let sleeper = Arc::new(RecordingSleeper::new());

    let record = orchestrator(&transport, &sleeper)
        .orchestrate("sales", "nightly")
        .unwrap();

    assert_eq!(record.operation_type, OperationType::Create);
    assert_eq!(record.snapshot_id.as_deref(), Some("snap-9"));
    assert_eq!(sleeper.count(), 0);

    let post = &transport.requests()[2];
    assert_eq!(post.url, format!("{}/workspaces/ws-1/warehousesnapshots", BASE));
    assert_eq!(post.body.as_ref().unwrap()["creationPayload"]["parentWarehouseId"], "wh-1");
}

#[test]
fn test_snapshot_of_another_warehouse_is_not_reused() {
    let transport = ScriptedTransport::new()
        .respond_json(200, warehouses())
        .respond_json(200, json!({"value": [
            {"id": "snap-x", "displayName": "nightly", "type": "WarehouseSnapshot",
             "properties": {"parentWarehouseId": "wh-other"}},
        ]}))
        .respond_json(201, json!({"id": "snap-new"}));
    let sleeper = Arc::new(RecordingSleeper::new());

    let record = orchestrator(&transport, &sleeper)
        .orchestrate("sales", "nightly")
        .unwrap();
    assert_eq!(record.snapshot_id.as_deref(), Some("snap-new"));
}

#[test]
fn test_accepted_create_polls_to_completion() {
    let transport = ScriptedTransport::new()
        .respond_json(200, warehouses())
        .respond_json(200, json!({"value": []}))
        .respond(
            ApiResponse::new(202, "")
                .with_header("Location", LOCATION)
                .with_header("x-ms-operation-id", "op-42"),
        )
        .respond(ApiResponse::new(202, ""))
        .respond(ApiResponse::new(202, ""))
        .respond(ApiResponse::new(201, ""))
        .respond_json(200, json!({"resourceId": "snap-42"}));
    let sleeper = Arc::new(RecordingSleeper::new());

    let record = orchestrator(&transport, &sleeper)
        .orchestrate("sales", "nightly")
        .unwrap();

    assert_eq!(record.snapshot_id.as_deref(), Some("snap-42"));
    assert_eq!(record.operation, json!({"resourceId": "snap-42"}));
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(30), Duration::from_secs(30)]
    );

    let requests = transport.requests();
    assert_eq!(requests.last().unwrap().url, format!("{}/result", LOCATION));
    assert_eq!(transport.remaining(), 0);
}

#[test]
fn test_accepted_create_times_out() {
    let mut transport = ScriptedTransport::new()
        .respond_json(200, warehouses())
        .respond_json(200, json!({"value": []}))
        .respond(
            ApiResponse::new(202, "")
                .with_header("Location", LOCATION)
                .with_header("x-ms-operation-id", "op-42")
                .with_header("Retry-After", "1"),
        );
    for _ in 0..5 {
        transport = transport.respond_json(200, json!({"status": "Running"}));
    }
    let sleeper = Arc::new(RecordingSleeper::new());

    let err = orchestrator(&transport, &sleeper)
        .orchestrate("sales", "nightly")
        .unwrap_err();

    assert_eq!(
        err,
        ControlPlaneError::OperationTimeout {
            operation_id: "op-42".to_string(),
            attempts: 5
        }
    );
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(1); 5]);
}

#[test]
fn test_missing_warehouse_is_fatal() {
    let transport = ScriptedTransport::new().respond_json(200, warehouses());
    let sleeper = Arc::new(RecordingSleeper::new());

    let err = orchestrator(&transport, &sleeper)
        .orchestrate("finance", "nightly")
        .unwrap_err();

    assert_eq!(
        err,
        ControlPlaneError::WarehouseNotFound {
            warehouse: "finance".to_string(),
            workspace_id: "ws-1".to_string()
        }
    );
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn test_refresh_updates_recorded_snapshot() {
    let transport = ScriptedTransport::new()
        .respond_json(200, warehouses())
        .respond_json(200, snapshots_with_existing())
        .respond_json(200, updated())
        .respond_json(200, updated());
    let sleeper = Arc::new(RecordingSleeper::new());
    let orchestrator = orchestrator(&transport, &sleeper);

    let record = orchestrator.orchestrate("sales", "nightly").unwrap();
    let refreshed = orchestrator.refresh(&record).unwrap().unwrap();

    assert_eq!(refreshed.operation_type, OperationType::Update);
    assert_eq!(
        transport.requests()[3].url,
        format!("{}/workspaces/ws-1/warehousesnapshots/snap-1", BASE)
    );
}
