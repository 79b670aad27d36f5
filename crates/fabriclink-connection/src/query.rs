//! Statement execution with transient-error retry

use crate::connection::ConnectionHandle;
use crate::retry::{RetryPolicy, RETRY_INTERVAL};
use fabriclink_core::Sleeper;
use fabriclink_driver::{
    convert_datetimeoffset, Cursor, DriverBackend, DriverError, Row, SqlValue,
    SQL_SS_TIMESTAMPOFFSET,
};
use std::fmt;
use tracing::debug;

/// Lower bound on the query retry limit
pub const MIN_QUERY_RETRIES: u32 = 3;

/// Status of an executed statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterResponse {
    pub message: String,
    /// Rows affected, -1 when the driver does not know
    pub rows_affected: i64,
}

impl AdapterResponse {
    pub fn from_rowcount(rows_affected: i64) -> Self {
        Self {
            message: "OK".to_string(),
            rows_affected,
        }
    }
}

impl fmt::Display for AdapterResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Effective retry limit for a configured retry count
pub fn query_retry_limit(configured: u32) -> u32 {
    configured.max(MIN_QUERY_RETRIES)
}

/// Bind parameters as sent to the driver; datetimes become ISO-8601 text
pub fn bind_parameters(bindings: Option<&[SqlValue]>) -> Option<Vec<SqlValue>> {
    bindings.map(|values| {
        values
            .iter()
            .cloned()
            .map(SqlValue::into_bind_parameter)
            .collect()
    })
}

/// Execute `sql`, retrying transient errors on the same cursor
///
/// The cursor is acquired once; failing to acquire it is not retried. Once
/// `retry_limit` attempts are used the last driver error is returned
/// unmodified. On success the DATETIMEOFFSET converter is registered on the
/// connection.
pub fn execute_with_retry(
    handle: &mut ConnectionHandle,
    sql: &str,
    bindings: Option<&[SqlValue]>,
    backend: &DriverBackend,
    sleeper: &dyn Sleeper,
    retry_limit: u32,
) -> Result<Box<dyn Cursor>, DriverError> {
    let parameters = bind_parameters(bindings);
    let policy = RetryPolicy::new(retry_limit, RETRY_INTERVAL);

    let mut cursor = handle.cursor()?;
    policy.run(
        sleeper,
        |e: &DriverError| backend.is_retryable(e),
        |attempt| -> Result<(), DriverError> {
            debug!(attempt, "Executing statement");
            cursor.execute(sql, parameters.as_deref())
        },
    )?;

    backend.register_output_converter(
        handle.driver_connection(),
        SQL_SS_TIMESTAMPOFFSET,
        convert_datetimeoffset,
    );
    Ok(cursor)
}

/// Read the response and, when `fetch` is set, the first result set with
/// columns; the remaining sets are stepped through and dropped.
pub fn collect_results(
    cursor: &mut dyn Cursor,
    fetch: bool,
    limit: Option<usize>,
) -> Result<(AdapterResponse, Vec<Row>), DriverError> {
    let response = AdapterResponse::from_rowcount(cursor.rowcount());

    let mut rows = Vec::new();
    if fetch {
        let mut has_columns = cursor.has_result_set();
        while !has_columns {
            if !cursor.next_set()? {
                break;
            }
            has_columns = cursor.has_result_set();
        }

        if has_columns {
            rows = cursor.fetch_all()?;
            if let Some(limit) = limit {
                rows.truncate(limit);
            }
        }
    }

    while cursor.next_set()? {}

    Ok((response, rows))
}
