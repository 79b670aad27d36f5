//! Snapshot orchestration
//!
//! Makes a named snapshot of a warehouse current: update it when it exists,
//! create it otherwise. Calling [`SnapshotOrchestrator::orchestrate`] again
//! for the same pair updates and never creates a second snapshot.

use crate::client::{ControlPlaneClient, SnapshotRecord};
use crate::error::ControlPlaneError;
use tracing::{error, info};

pub struct SnapshotOrchestrator {
    client: ControlPlaneClient,
}

impl SnapshotOrchestrator {
    pub fn new(client: ControlPlaneClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ControlPlaneClient {
        &self.client
    }

    /// Create or update `snapshot_name` for the warehouse `warehouse_name`
    pub fn orchestrate(
        &self,
        warehouse_name: &str,
        snapshot_name: &str,
    ) -> Result<SnapshotRecord, ControlPlaneError> {
        self.run(warehouse_name, snapshot_name).map_err(|e| {
            error!(error = %e, "Snapshot management failed");
            e
        })
    }

    fn run(
        &self,
        warehouse_name: &str,
        snapshot_name: &str,
    ) -> Result<SnapshotRecord, ControlPlaneError> {
        info!(warehouse = warehouse_name, "Looking up warehouse");
        let warehouses = self.client.list_warehouses()?;
        let warehouse_id = ControlPlaneClient::find_warehouse_id(&warehouses, warehouse_name)
            .ok_or_else(|| ControlPlaneError::WarehouseNotFound {
                warehouse: warehouse_name.to_string(),
                workspace_id: self.client.workspace_id().to_string(),
            })?;
        info!(warehouse_id = %warehouse_id, "Found warehouse");

        let snapshots = self.client.list_snapshots()?;
        let existing = if snapshots.is_empty() {
            None
        } else {
            info!(snapshot = snapshot_name, "Checking for existing snapshot");
            ControlPlaneClient::find_snapshot_id(&snapshots, &warehouse_id, snapshot_name)
        };

        match existing {
            Some(snapshot_id) => self.client.update_snapshot(&snapshot_id),
            None => {
                info!(snapshot = snapshot_name, "Creating new snapshot");
                self.client.create_snapshot(&warehouse_id, snapshot_name)
            }
        }
    }

    /// Move an orchestrated snapshot's timestamp to now
    pub fn refresh(&self, record: &SnapshotRecord) -> Result<Option<SnapshotRecord>, ControlPlaneError> {
        match &record.snapshot_id {
            Some(snapshot_id) => {
                info!(
                    snapshot = record.display_name.as_deref().unwrap_or(""),
                    snapshot_id = %snapshot_id,
                    "Updating warehouse snapshot timestamp at end of run"
                );
                self.client.update_snapshot(snapshot_id).map(Some)
            }
            None => {
                info!("Snapshot has no id, skipping timestamp update");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for SnapshotOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotOrchestrator")
            .field("client", &self.client)
            .finish()
    }
}
