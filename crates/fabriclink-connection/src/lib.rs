//! Warehouse connection lifecycle
//!
//! [`ConnectionManager`] opens [`Connection`]s through the active driver
//! backend, retries transient failures, runs statements behind a single
//! error boundary, and triggers the one-time snapshot orchestration of a
//! [`RunLifecycle`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use fabriclink_connection::{Connection, ConnectionManager};
//!
//! let manager = ConnectionManager::new(credentials, resolver, authenticator);
//! let mut conn = Connection::new("model.sales.orders");
//! manager.open(&mut conn)?;
//! let (response, rows) = manager.execute(&mut conn, "select 1", true, None)?;
//! manager.release(&mut conn)?;
//! ```

pub mod error;
pub mod retry;
pub mod connection;
pub mod query;
pub mod manager;
pub mod lifecycle;

pub use error::ConnectionError;
pub use retry::{RetryPolicy, RETRY_INTERVAL};
pub use connection::{Connection, ConnectionHandle, ConnectionState};
pub use query::{
    bind_parameters, collect_results, execute_with_retry, query_retry_limit, AdapterResponse,
    MIN_QUERY_RETRIES,
};
pub use manager::{login_fields, ConnectionManager, DEFAULT_APPLICATION_NAME, POOL_MAX_SIZE};
pub use lifecycle::{
    ControlPlaneConnector, LiveControlPlane, PostRunHook, RunLifecycle, TARGET_COMMANDS,
};
