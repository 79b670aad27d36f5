//! Driver backend abstraction for warehouse connections
//!
//! Two mutually incompatible native drivers sit behind one capability
//! surface, [`DriverBackend`]:
//!
//! - `native` - authentication travels inside the connection string
//! - `odbc` - needs a `DRIVER={...}` prefix and receives bearer tokens out of
//!   band as pre-connect attributes
//!
//! The host registers whichever native drivers are installed in a
//! [`DriverRegistry`]; [`resolve_backend`] is the only place availability is
//! probed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fabriclink_driver::{BackendKind, BackendResolver, DriverRegistry};
//!
//! let registry = DriverRegistry::new()
//!     .with_driver(BackendKind::Odbc, Arc::new(my_odbc_driver));
//! let resolver = BackendResolver::new(registry);
//! let backend = resolver.resolve(DriverPreference::Auto)?;
//! let conn_str = backend.build_connection_string(&params)?;
//! ```

pub mod error;
pub mod driver;
pub mod backend;
pub mod connection_string;
pub mod registry;
pub mod encoding;
pub mod mock;

pub use error::{BackendError, DriverError, DriverErrorKind};
pub use driver::{
    Cursor, DriverConnection, NativeDriver, OutputConverter, PreAuthAttributes, Row, SqlValue,
    SQL_COPT_SS_ACCESS_TOKEN, SQL_SS_TIMESTAMPOFFSET,
};
pub use backend::{BackendKind, DriverBackend};
pub use connection_string::{mask_secret, ConnectionStringParams, DEFAULT_ODBC_DRIVER};
pub use registry::{
    effective_preference, effective_preference_from, resolve_backend, BackendResolver,
    DriverRegistry,
};
pub use encoding::{
    convert_datetimeoffset, datetimeoffset_from_bytes, decode_access_token, encode_access_token,
    encode_token_bytes,
};
pub use mock::{ConnectCall, ExecutedStatement, MockDriver};
