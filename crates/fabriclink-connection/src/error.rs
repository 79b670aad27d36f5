//! Connection errors

use fabriclink_auth::AuthError;
use fabriclink_core::ConfigError;
use fabriclink_driver::{BackendError, DriverError};
use fabriclink_snapshots::ControlPlaneError;

/// Errors surfaced by the connection layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Driver error propagated as raised
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    /// Database-classified driver error, after the connection was released
    #[error("Database Error\n  {0}")]
    Database(String),

    /// Any other failure while running SQL
    #[error("Runtime Error\n  {0}")]
    Runtime(String),
}

impl ConnectionError {
    /// Errors already produced by this layer's boundary handling
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Runtime(_))
    }

    /// The driver error, when this is one
    pub fn as_driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Driver(e) => Some(e),
            _ => None,
        }
    }
}
