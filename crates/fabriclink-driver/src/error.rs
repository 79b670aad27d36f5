//! Driver error taxonomy

use crate::backend::BackendKind;
use fabriclink_core::ConfigError;
use std::fmt;

/// Category of a native driver error
///
/// Mirrors the usual DB-API hierarchy: everything except `Interface` is a
/// database error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// Failure in the driver interface itself (e.g. token handshake)
    Interface,

    /// Generic database error
    Database,

    /// Connectivity and server-side operational failures
    Operational,

    /// Internal driver or server state errors
    Internal,

    /// Malformed SQL, missing objects
    Programming,

    /// Constraint violations
    Integrity,

    /// Bad data values
    Data,

    /// Unsupported feature
    NotSupported,
}

impl DriverErrorKind {
    pub fn is_database_error(&self) -> bool {
        !matches!(self, Self::Interface)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interface => "InterfaceError",
            Self::Database => "DatabaseError",
            Self::Operational => "OperationalError",
            Self::Internal => "InternalError",
            Self::Programming => "ProgrammingError",
            Self::Integrity => "IntegrityError",
            Self::Data => "DataError",
            Self::NotSupported => "NotSupportedError",
        }
    }
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a native driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn interface(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Interface, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Database, message)
    }

    pub fn operational(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Operational, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Internal, message)
    }

    pub fn programming(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Programming, message)
    }

    pub fn is_database_error(&self) -> bool {
        self.kind.is_database_error()
    }
}

/// Errors selecting a driver backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    InvalidPreference(#[from] ConfigError),

    #[error("{backend} driver backend is not available: {reason}")]
    Unavailable { backend: BackendKind, reason: String },
}
