//! Run lifecycle: one-time snapshot orchestration and the post-run hook
//!
//! The first connection opened during an allow-listed command refreshes the
//! warehouse snapshot. When that succeeds a [`PostRunHook`] is kept; the host
//! calls [`RunLifecycle::finish`] after the run to refresh the snapshot again
//! if the run succeeded. A host that never calls `finish` gets a no-op.
//!
//! Nothing here ever fails a connection: errors are logged and dropped.

use crate::error::ConnectionError;
use fabriclink_auth::TokenAuthenticator;
use fabriclink_core::{Credentials, RunResults, RunStatus, Sleeper};
use fabriclink_snapshots::{
    ControlPlaneClient, ReqwestTransport, SnapshotOrchestrator, SnapshotRecord,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Commands that trigger snapshot orchestration
pub const TARGET_COMMANDS: &[&str] = &["run", "build", "snapshot"];

/// Builds an orchestrator bound to a workspace
pub trait ControlPlaneConnector: Send + Sync {
    fn connect(
        &self,
        credentials: &Credentials,
        workspace_id: &str,
    ) -> Result<SnapshotOrchestrator, ConnectionError>;
}

/// Connector for the live REST control plane
pub struct LiveControlPlane {
    authenticator: Arc<TokenAuthenticator>,
    sleeper: Arc<dyn Sleeper>,
    timeout: Option<Duration>,
}

impl LiveControlPlane {
    pub fn new(authenticator: Arc<TokenAuthenticator>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            authenticator,
            sleeper,
            timeout: None,
        }
    }

    /// Per-request HTTP timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl ControlPlaneConnector for LiveControlPlane {
    fn connect(
        &self,
        credentials: &Credentials,
        workspace_id: &str,
    ) -> Result<SnapshotOrchestrator, ConnectionError> {
        let token = self.authenticator.control_plane_token(credentials)?;
        let transport = ReqwestTransport::with_timeout(token, self.timeout)?;
        let client = ControlPlaneClient::from_credentials(
            credentials,
            Arc::new(transport),
            Arc::clone(&self.sleeper),
            workspace_id,
        );
        Ok(SnapshotOrchestrator::new(client))
    }
}

/// Deferred end-of-run action
pub struct PostRunHook {
    orchestrator: SnapshotOrchestrator,
    record: Option<SnapshotRecord>,
}

impl PostRunHook {
    /// Snapshot produced when the run started
    pub fn record(&self) -> Option<&SnapshotRecord> {
        self.record.as_ref()
    }

    /// Refresh the snapshot when the run succeeded
    pub fn run(self, run_results: &Path) -> Option<SnapshotRecord> {
        let Some(record) = self.record else {
            debug!("No snapshot was recorded at start, skipping end-of-run update");
            return None;
        };

        let status = RunResults::status_from_file(run_results);
        if status != RunStatus::Success {
            info!(%status, "Run did not succeed, skipping end-of-run snapshot update");
            return None;
        }

        match self.orchestrator.refresh(&record) {
            Ok(Some(updated)) => {
                info!(
                    snapshot_id = ?updated.snapshot_id,
                    "Warehouse snapshot updated at end of run"
                );
                Some(updated)
            }
            Ok(None) => {
                warn!("Recorded snapshot has no id, skipping end-of-run update");
                None
            }
            Err(e) => {
                error!(error = %e, "End-of-run snapshot update failed");
                None
            }
        }
    }
}

/// Per-process run state shared by all connection managers
pub struct RunLifecycle {
    command: Option<String>,
    connector: Arc<dyn ControlPlaneConnector>,
    started: Mutex<bool>,
    hook: Mutex<Option<PostRunHook>>,
}

impl RunLifecycle {
    pub fn new(command: Option<String>, connector: Arc<dyn ControlPlaneConnector>) -> Self {
        Self {
            command,
            connector,
            started: Mutex::new(false),
            hook: Mutex::new(None),
        }
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Whether the invoking command is allow-listed
    ///
    /// `command` is the subcommand name alone, matched exactly: pass `run`,
    /// not `dbt run --select x`. Names that merely contain a target, such as
    /// `run-operation`, do not match.
    pub fn should_run(&self) -> bool {
        self.command
            .as_deref()
            .map(|command| TARGET_COMMANDS.contains(&command))
            .unwrap_or(false)
    }

    pub fn has_started(&self) -> bool {
        *self.started.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Orchestrate the snapshot at most once per process
    ///
    /// Other callers block until the first one finishes.
    pub fn start_once(&self, credentials: &Credentials) {
        if !self.should_run() {
            return;
        }

        let mut started = self.started.lock().unwrap_or_else(|e| e.into_inner());
        if *started {
            return;
        }
        *started = true;

        let Some(workspace_id) = credentials.workspace_id.as_deref() else {
            warn!("workspace_id is not set, skipping warehouse snapshot");
            return;
        };

        let orchestrator = match self.connector.connect(credentials, workspace_id) {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                error!(error = %e, "Could not reach the control plane, skipping warehouse snapshot");
                return;
            }
        };

        let record = match credentials.warehouse_snapshot_name.as_deref() {
            None => {
                info!("warehouse_snapshot_name is not set, skipping warehouse snapshot");
                None
            }
            Some(snapshot_name) => {
                match orchestrator.orchestrate(&credentials.database, snapshot_name) {
                    Ok(record) => {
                        info!(
                            snapshot_id = ?record.snapshot_id,
                            operation = %record.operation_type,
                            "Warehouse snapshot ready"
                        );
                        Some(record)
                    }
                    Err(e) => {
                        error!(error = %e, "Warehouse snapshot failed");
                        return;
                    }
                }
            }
        };

        *self.hook.lock().unwrap_or_else(|e| e.into_inner()) = Some(PostRunHook {
            orchestrator,
            record,
        });
    }

    /// Remove the registered hook, if any
    pub fn take_post_run_hook(&self) -> Option<PostRunHook> {
        self.hook.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Run the post-run hook against a run-results artifact
    ///
    /// Returns the refreshed snapshot when an update happened.
    pub fn finish(&self, run_results: &Path) -> Option<SnapshotRecord> {
        self.take_post_run_hook()?.run(run_results)
    }
}

impl std::fmt::Debug for RunLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLifecycle")
            .field("command", &self.command)
            .field("started", &self.has_started())
            .finish()
    }
}
