//! Control-plane errors

/// Errors talking to the REST control plane
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlPlaneError {
    /// The service reported the operation as failed
    #[error("Operation {operation_id} failed: {code} - {message}")]
    OperationFailed {
        operation_id: String,
        code: String,
        message: String,
    },

    /// Polling ran out of attempts without a terminal state
    #[error("Operation {operation_id} timed out after {attempts} attempts")]
    OperationTimeout { operation_id: String, attempts: u32 },

    /// Non-success status outside the polling protocol
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Request never produced a response
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Warehouse '{warehouse}' not found in workspace {workspace_id}")]
    WarehouseNotFound {
        warehouse: String,
        workspace_id: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("202 response received but no Location header found")]
    MissingLocation,
}
