//! Connection manager: opening, statement execution and error boundaries

use crate::connection::{Connection, ConnectionHandle, ConnectionState};
use crate::error::ConnectionError;
use crate::lifecycle::RunLifecycle;
use crate::query::{self, AdapterResponse};
use crate::retry::{RetryPolicy, RETRY_INTERVAL};
use fabriclink_auth::TokenAuthenticator;
use fabriclink_core::{AuthenticationMode, Credentials, Sleeper, ThreadSleeper};
use fabriclink_driver::{
    mask_secret, BackendKind, BackendResolver, ConnectionStringParams, Cursor, DriverBackend,
    DriverConnection, Row, SqlValue,
};
use std::sync::{Arc, Once};
use tracing::{debug, info, warn};

/// Application name reported to the warehouse
pub const DEFAULT_APPLICATION_NAME: &str = concat!("fabriclink/", env!("CARGO_PKG_VERSION"));

/// Upper bound handed to driver pooling
pub const POOL_MAX_SIZE: usize = 100;

/// Driver pooling is process-wide, so it is configured once per process
static POOLING_CONFIGURED: Once = Once::new();

/// UID and PWD sent for an authentication mode
pub fn login_fields(credentials: &Credentials) -> (Option<&str>, Option<&str>) {
    match credentials.authentication {
        AuthenticationMode::ActiveDirectoryPassword => {
            (credentials.uid.as_deref(), credentials.pwd.as_deref())
        }
        AuthenticationMode::ActiveDirectoryServicePrincipal => (
            credentials.client_id.as_deref(),
            credentials.client_secret.as_deref(),
        ),
        AuthenticationMode::ActiveDirectoryInteractive => (credentials.uid.as_deref(), None),
        _ => (None, None),
    }
}

/// Opens and runs statements on warehouse connections for one profile
///
/// Shared by all worker threads; each worker owns its [`Connection`].
pub struct ConnectionManager {
    credentials: Credentials,
    resolver: Arc<BackendResolver>,
    authenticator: Arc<TokenAuthenticator>,
    sleeper: Arc<dyn Sleeper>,
    lifecycle: Option<Arc<RunLifecycle>>,
    application_name: String,
}

impl ConnectionManager {
    pub fn new(
        credentials: Credentials,
        resolver: Arc<BackendResolver>,
        authenticator: Arc<TokenAuthenticator>,
    ) -> Self {
        Self {
            credentials,
            resolver,
            authenticator,
            sleeper: Arc::new(ThreadSleeper),
            lifecycle: None,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Attach the run lifecycle that gates snapshot orchestration
    pub fn with_lifecycle(mut self, lifecycle: Arc<RunLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn with_application_name(mut self, application_name: impl Into<String>) -> Self {
        self.application_name = application_name.into();
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn lifecycle(&self) -> Option<&Arc<RunLifecycle>> {
        self.lifecycle.as_ref()
    }

    /// Adapter type name
    pub fn type_name(&self) -> &'static str {
        self.credentials.type_name()
    }

    /// Query retry limit, never below three
    pub fn retry_limit(&self) -> u32 {
        query::query_retry_limit(self.credentials.retries)
    }

    /// The active backend, honoring the environment override
    ///
    /// Pooling is configured, and the ignored `driver` setting reported, the
    /// first time any manager in the process resolves a backend.
    pub fn backend(&self) -> Result<DriverBackend, ConnectionError> {
        let backend = self
            .resolver
            .resolve_effective(self.credentials.driver_backend)?;

        POOLING_CONFIGURED.call_once(|| {
            backend.configure_pooling(self.credentials.pooling, POOL_MAX_SIZE);
            if backend.kind() == BackendKind::Native && self.credentials.driver.is_some() {
                warn!(
                    "The 'driver' setting is ignored by the native backend and is deprecated; \
                     remove it from the profile"
                );
            }
        });

        Ok(backend)
    }

    /// Connection string with its secret masked, for display
    pub fn display_connection_string(&self) -> Result<String, ConnectionError> {
        let backend = self.backend()?;
        let (uid, pwd) = login_fields(&self.credentials);
        let params =
            ConnectionStringParams::from_credentials(&self.credentials, &self.application_name, uid, pwd);
        let connection_string = backend.build_connection_string(&params)?;
        Ok(mask_secret(&connection_string, pwd))
    }

    /// Open `connection`; a no-op when it is already open
    ///
    /// Transient driver errors are retried up to `retries` attempts, one
    /// second apart. The final error is returned unmodified.
    pub fn open(&self, connection: &mut Connection) -> Result<(), ConnectionError> {
        if connection.is_open() {
            debug!(connection = connection.name(), "Connection is already open, skipping open");
            return Ok(());
        }

        connection.set_state(ConnectionState::Opening);
        match self.connect() {
            Ok(handle) => connection.attach(handle),
            Err(e) => {
                connection.set_state(ConnectionState::Failed);
                return Err(e);
            }
        }
        info!(connection = connection.name(), "Connected to the warehouse");

        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.start_once(&self.credentials);
        }
        Ok(())
    }

    fn connect(&self) -> Result<ConnectionHandle, ConnectionError> {
        let backend = self.backend()?;
        let credentials = &self.credentials;

        let (uid, pwd) = login_fields(credentials);
        let params =
            ConnectionStringParams::from_credentials(credentials, &self.application_name, uid, pwd);
        let connection_string = backend.build_connection_string(&params)?;
        debug!(
            backend = backend.name(),
            connection_string = %mask_secret(&connection_string, pwd),
            "Using connection string"
        );

        let policy = RetryPolicy::new(credentials.retries, RETRY_INTERVAL);
        let inner = policy.run(
            self.sleeper.as_ref(),
            |e: &ConnectionError| {
                e.as_driver_error()
                    .map(|driver_err| backend.is_retryable(driver_err))
                    .unwrap_or(false)
            },
            |attempt| -> Result<Box<dyn DriverConnection>, ConnectionError> {
                debug!(attempt, backend = backend.name(), "Opening connection");
                let attrs = self.authenticator.pre_auth_attributes(credentials, &backend)?;
                let inner =
                    backend.connect(&connection_string, credentials.login_timeout(), true, &attrs)?;
                Ok(inner)
            },
        )?;

        Ok(ConnectionHandle::new(inner, credentials.query_timeout()))
    }

    /// Roll back, if possible, and close the connection
    pub fn release(&self, connection: &mut Connection) -> Result<(), ConnectionError> {
        if let Err(e) = connection.rollback() {
            debug!(error = %e, "Rollback before release failed");
        }
        connection.release()?;
        Ok(())
    }

    /// Run `f` behind the statement error boundary
    ///
    /// - database errors: release (failures ignored), then [`ConnectionError::Database`]
    /// - other driver errors: unchanged
    /// - errors already raised by this boundary: rollback and release, then unchanged
    /// - anything else: rollback and release, then [`ConnectionError::Runtime`]
    pub fn with_exception_handler<T, F>(
        &self,
        connection: &mut Connection,
        sql: &str,
        f: F,
    ) -> Result<T, ConnectionError>
    where
        F: FnOnce(&mut Connection, &DriverBackend) -> Result<T, ConnectionError>,
    {
        let backend = self.backend()?;

        let error = match f(connection, &backend) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        match error {
            ConnectionError::Driver(e) if backend.is_database_error(&e) => {
                debug!(error = %e, "Database error");
                if let Err(release_err) = connection.release() {
                    debug!(error = %release_err, "Failed to release connection");
                }
                Err(ConnectionError::Database(e.to_string().trim().to_string()))
            }
            driver_err @ ConnectionError::Driver(_) => Err(driver_err),
            other => {
                debug!(sql, "Error running SQL");
                debug!("Rolling back transaction");
                if let Err(release_err) = self.release(connection) {
                    debug!(error = %release_err, "Failed to release connection");
                }
                if other.is_internal() {
                    Err(other)
                } else {
                    Err(ConnectionError::Runtime(other.to_string()))
                }
            }
        }
    }

    /// Execute `sql` and return the cursor positioned on its first result set
    pub fn add_query(
        &self,
        connection: &mut Connection,
        sql: &str,
        bindings: Option<&[SqlValue]>,
    ) -> Result<Box<dyn Cursor>, ConnectionError> {
        let retry_limit = self.retry_limit();
        let sleeper = Arc::clone(&self.sleeper);

        self.with_exception_handler(connection, sql, |connection, backend| {
            debug!(connection = connection.name(), sql, "Running statement");
            let handle = connection.handle_mut()?;
            let cursor = query::execute_with_retry(
                handle,
                sql,
                bindings,
                backend,
                sleeper.as_ref(),
                retry_limit,
            )?;
            debug!(rows_affected = cursor.rowcount(), "SQL status: OK");
            Ok(cursor)
        })
    }

    /// Execute `sql`, optionally fetching the first result set with columns
    pub fn execute(
        &self,
        connection: &mut Connection,
        sql: &str,
        fetch: bool,
        limit: Option<usize>,
    ) -> Result<(AdapterResponse, Vec<Row>), ConnectionError> {
        let mut cursor = self.add_query(connection, sql, None)?;
        self.with_exception_handler(connection, sql, |_, _| {
            Ok(query::collect_results(cursor.as_mut(), fetch, limit)?)
        })
    }

    /// Transactions are implicit; connections run in autocommit mode
    pub fn add_begin_query(&self) {}

    pub fn add_commit_query(&self) {}

    /// Statements cannot be cancelled through the driver surface
    pub fn cancel(&self, connection: &Connection) {
        info!(connection = connection.name(), "Cancel requested; statements run to completion");
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("host", &self.credentials.host)
            .field("database", &self.credentials.database)
            .field("application_name", &self.application_name)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
