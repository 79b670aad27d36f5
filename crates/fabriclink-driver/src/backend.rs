//! Driver backends: one capability surface over two native drivers

use crate::connection_string::{self, ConnectionStringParams};
use crate::driver::{DriverConnection, NativeDriver, OutputConverter, PreAuthAttributes};
use crate::error::{DriverError, DriverErrorKind};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which of the two native drivers a backend wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Auth in the connection string, no driver prefix
    Native,

    /// `DRIVER={...}` prefix, braced UID/PWD, out-of-band tokens
    Odbc,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Odbc => "odbc",
        }
    }

    /// Build the connection string the driver of this kind expects
    pub fn build_connection_string(
        &self,
        params: &ConnectionStringParams<'_>,
    ) -> Result<String, DriverError> {
        match self {
            Self::Native => connection_string::build_native(params),
            Self::Odbc => connection_string::build_odbc(params),
        }
    }

    /// Whether bearer tokens go to the driver as pre-connect attribute bytes
    pub fn requires_token_bytes(&self) -> bool {
        matches!(self, Self::Odbc)
    }

    /// Error kinds worth another attempt
    pub fn retryable_kinds(&self) -> &'static [DriverErrorKind] {
        match self {
            Self::Native => &[DriverErrorKind::Operational, DriverErrorKind::Interface],
            Self::Odbc => &[
                DriverErrorKind::Internal,
                DriverErrorKind::Operational,
                DriverErrorKind::Interface,
            ],
        }
    }

    pub fn is_retryable(&self, error: &DriverError) -> bool {
        self.retryable_kinds().contains(&error.kind)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Native driver backend
#[derive(Clone)]
pub struct NativeBackend {
    driver: Arc<dyn NativeDriver>,
}

/// ODBC driver backend
#[derive(Clone)]
pub struct OdbcBackend {
    driver: Arc<dyn NativeDriver>,
}

/// The resolved driver backend
///
/// Exactly two variants; only [`crate::resolve_backend`] constructs them.
#[derive(Clone)]
pub enum DriverBackend {
    Native(NativeBackend),
    Odbc(OdbcBackend),
}

impl DriverBackend {
    pub(crate) fn native(driver: Arc<dyn NativeDriver>) -> Self {
        Self::Native(NativeBackend { driver })
    }

    pub(crate) fn odbc(driver: Arc<dyn NativeDriver>) -> Self {
        Self::Odbc(OdbcBackend { driver })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Native(_) => BackendKind::Native,
            Self::Odbc(_) => BackendKind::Odbc,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn driver(&self) -> &Arc<dyn NativeDriver> {
        match self {
            Self::Native(backend) => &backend.driver,
            Self::Odbc(backend) => &backend.driver,
        }
    }

    /// Open a native connection
    ///
    /// The native backend ignores `attrs_before`; its authentication is part
    /// of the connection string.
    pub fn connect(
        &self,
        connection_string: &str,
        timeout: Duration,
        autocommit: bool,
        attrs_before: &PreAuthAttributes,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        match self {
            Self::Native(backend) => backend.driver.connect(
                connection_string,
                timeout,
                autocommit,
                &PreAuthAttributes::default(),
            ),
            Self::Odbc(backend) => {
                backend
                    .driver
                    .connect(connection_string, timeout, autocommit, attrs_before)
            }
        }
    }

    /// Configure driver pooling
    ///
    /// The native driver pools by default; only enabling reaches it.
    pub fn configure_pooling(&self, enabled: bool, max_size: usize) {
        match self {
            Self::Native(backend) => {
                if enabled {
                    backend.driver.set_pooling(true, max_size);
                }
            }
            Self::Odbc(backend) => backend.driver.set_pooling(enabled, max_size),
        }
    }

    pub fn register_output_converter(
        &self,
        connection: &mut dyn DriverConnection,
        sql_type: i32,
        converter: OutputConverter,
    ) {
        connection.add_output_converter(sql_type, converter);
    }

    /// Database-classified errors get the release-then-wrap treatment
    pub fn is_database_error(&self, error: &DriverError) -> bool {
        error.is_database_error()
    }

    pub fn retryable_kinds(&self) -> &'static [DriverErrorKind] {
        self.kind().retryable_kinds()
    }

    pub fn is_retryable(&self, error: &DriverError) -> bool {
        self.kind().is_retryable(error)
    }

    pub fn build_connection_string(
        &self,
        params: &ConnectionStringParams<'_>,
    ) -> Result<String, DriverError> {
        self.kind().build_connection_string(params)
    }

    pub fn requires_token_bytes(&self) -> bool {
        self.kind().requires_token_bytes()
    }
}

impl fmt::Debug for DriverBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverBackend")
            .field("kind", &self.kind())
            .field("driver", &self.driver().name())
            .finish()
    }
}
