//! Warehouse snapshot management over the REST control plane
//!
//! - [`ControlPlaneClient`] lists warehouses and snapshots, creates and updates
//!   snapshots
//! - [`OperationPoller`] follows `202 Accepted` creates to completion
//! - [`SnapshotOrchestrator`] ties lookup, create and update together
//!
//! Requests go through an [`HttpTransport`]: [`ReqwestTransport`] in
//! production, [`ScriptedTransport`] in tests.

pub mod error;
pub mod transport;
pub mod poller;
pub mod client;
pub mod orchestrator;
pub mod mock;

pub use error::ControlPlaneError;
pub use transport::{ApiRequest, ApiResponse, HttpMethod, HttpTransport, ReqwestTransport};
pub use poller::{
    LongRunningOperation, OperationPoller, OperationStatus, DEFAULT_MAX_RETRIES,
    DEFAULT_POLL_DELAY,
};
pub use client::{snapshot_timestamp, ControlPlaneClient, OperationType, SnapshotRecord};
pub use orchestrator::SnapshotOrchestrator;
pub use mock::ScriptedTransport;
