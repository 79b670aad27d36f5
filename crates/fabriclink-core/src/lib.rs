//! fabriclink Core
//!
//! Shared domain model for the warehouse connectivity layer: the credentials
//! record loaded from a profile, the enums that select authentication and
//! driver backends, and the run-results artifact the host writes at the end
//! of a run.

pub mod config;
pub mod artifacts;
pub mod sleep;

pub use config::{
    AuthenticationMode, ConfigError, Credentials, DriverPreference, TokenStrategy,
    DEFAULT_API_URL, DRIVER_BACKEND_ENV,
};
pub use artifacts::{RunResults, RunResultEntry, RunStatus, RUN_RESULTS_PATH};
pub use sleep::{RecordingSleeper, Sleeper, ThreadSleeper};
