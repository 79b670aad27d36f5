//! Mock native driver for testing
//!
//! Records every call the connectivity layer makes and replays scripted
//! failures and result sets without touching a real warehouse. Clones share
//! state, so a test can hand one clone to a backend and inspect the other.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fabriclink_driver::{DriverError, MockDriver};
//!
//! let driver = MockDriver::new("odbc")
//!     .with_connect_failures(vec![DriverError::operational("login timeout")])
//!     .with_result_set(vec![vec![SqlValue::Int(1)]]);
//!
//! // ... open a connection through a backend holding `driver.clone()` ...
//! assert_eq!(driver.connect_calls().len(), 2);
//! ```

use crate::driver::{
    Cursor, DriverConnection, NativeDriver, OutputConverter, PreAuthAttributes, Row, SqlValue,
};
use crate::error::DriverError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One recorded `connect` call
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectCall {
    pub connection_string: String,
    pub timeout: Duration,
    pub autocommit: bool,
    pub attrs_before: PreAuthAttributes,
}

/// One successfully executed statement
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub bindings: Option<Vec<SqlValue>>,
}

#[derive(Default)]
struct MockState {
    unsupported: Option<String>,
    connect_failures: VecDeque<DriverError>,
    execute_failures: VecDeque<DriverError>,
    failing_execute: Option<DriverError>,
    close_failure: Option<DriverError>,
    /// `None` marks a statement without columns
    result_sets: Vec<Option<Vec<Row>>>,
    rowcount: i64,

    connect_calls: Vec<ConnectCall>,
    executed: Vec<ExecutedStatement>,
    execute_attempts: usize,
    cursors_opened: usize,
    pooling: Option<(bool, usize)>,
    converters: Vec<i32>,
    query_timeouts: Vec<Duration>,
    rollbacks: usize,
    closes: usize,
    sets_visited: usize,
}

/// Mock native driver
#[derive(Clone)]
pub struct MockDriver {
    name: &'static str,
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(MockState {
                rowcount: -1,
                ..MockState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Report an unsupported runtime from `is_supported`
    pub fn unsupported(self, reason: impl Into<String>) -> Self {
        self.state().unsupported = Some(reason.into());
        self
    }

    /// Fail the next connects with these errors, in order
    pub fn with_connect_failures(self, errors: Vec<DriverError>) -> Self {
        self.state().connect_failures.extend(errors);
        self
    }

    /// Fail the next executes with these errors, in order
    pub fn with_execute_failures(self, errors: Vec<DriverError>) -> Self {
        self.state().execute_failures.extend(errors);
        self
    }

    /// Fail every execute with this error
    pub fn with_failing_execute(self, error: DriverError) -> Self {
        self.state().failing_execute = Some(error);
        self
    }

    /// Fail every close with this error
    pub fn with_close_failure(self, error: DriverError) -> Self {
        self.state().close_failure = Some(error);
        self
    }

    /// Append a result set with columns
    pub fn with_result_set(self, rows: Vec<Row>) -> Self {
        self.state().result_sets.push(Some(rows));
        self
    }

    /// Append a result set without columns (e.g. from a DML statement)
    pub fn with_statement_set(self) -> Self {
        self.state().result_sets.push(None);
        self
    }

    pub fn with_rowcount(self, rowcount: i64) -> Self {
        self.state().rowcount = rowcount;
        self
    }

    pub fn connect_calls(&self) -> Vec<ConnectCall> {
        self.state().connect_calls.clone()
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state().executed.clone()
    }

    /// Execute calls, failed ones included
    pub fn execute_attempts(&self) -> usize {
        self.state().execute_attempts
    }

    /// Cursors handed out across all connections
    pub fn cursors_opened(&self) -> usize {
        self.state().cursors_opened
    }

    /// Last pooling configuration, `None` if never configured
    pub fn pooling(&self) -> Option<(bool, usize)> {
        self.state().pooling
    }

    pub fn registered_converters(&self) -> Vec<i32> {
        self.state().converters.clone()
    }

    pub fn query_timeouts(&self) -> Vec<Duration> {
        self.state().query_timeouts.clone()
    }

    pub fn rollbacks(&self) -> usize {
        self.state().rollbacks
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    /// Result sets the cursor has advanced past
    pub fn sets_visited(&self) -> usize {
        self.state().sets_visited
    }
}

impl NativeDriver for MockDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_supported(&self) -> Result<(), String> {
        match &self.state().unsupported {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    fn connect(
        &self,
        connection_string: &str,
        timeout: Duration,
        autocommit: bool,
        attrs_before: &PreAuthAttributes,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        let mut state = self.state();
        state.connect_calls.push(ConnectCall {
            connection_string: connection_string.to_string(),
            timeout,
            autocommit,
            attrs_before: attrs_before.clone(),
        });

        if let Some(error) = state.connect_failures.pop_front() {
            return Err(error);
        }

        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn set_pooling(&self, enabled: bool, max_size: usize) {
        self.state().pooling = Some((enabled, max_size));
    }
}

/// Connection handed out by [`MockDriver`]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DriverConnection for MockConnection {
    fn set_query_timeout(&mut self, timeout: Duration) {
        self.state().query_timeouts.push(timeout);
    }

    fn cursor(&mut self) -> Result<Box<dyn Cursor>, DriverError> {
        self.state().cursors_opened += 1;
        Ok(Box::new(MockCursor {
            state: Arc::clone(&self.state),
            sets: Vec::new(),
            position: 0,
            rowcount: -1,
        }))
    }

    fn add_output_converter(&mut self, sql_type: i32, _converter: OutputConverter) {
        self.state().converters.push(sql_type);
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.state().rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let mut state = self.state();
        state.closes += 1;
        match &state.close_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Cursor handed out by [`MockConnection`]
pub struct MockCursor {
    state: Arc<Mutex<MockState>>,
    sets: Vec<Option<Vec<Row>>>,
    position: usize,
    rowcount: i64,
}

impl Cursor for MockCursor {
    fn execute(&mut self, sql: &str, bindings: Option<&[SqlValue]>) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.execute_attempts += 1;

        if let Some(error) = state.execute_failures.pop_front() {
            return Err(error);
        }
        if let Some(error) = &state.failing_execute {
            return Err(error.clone());
        }

        state.executed.push(ExecutedStatement {
            sql: sql.to_string(),
            bindings: bindings.map(<[SqlValue]>::to_vec),
        });
        self.sets = state.result_sets.clone();
        self.position = 0;
        self.rowcount = state.rowcount;
        Ok(())
    }

    fn rowcount(&self) -> i64 {
        self.rowcount
    }

    fn has_result_set(&self) -> bool {
        matches!(self.sets.get(self.position), Some(Some(_)))
    }

    fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError> {
        match self.sets.get_mut(self.position) {
            Some(Some(rows)) => Ok(std::mem::take(rows)),
            _ => Err(DriverError::programming("No results. Previous SQL was not a query.")),
        }
    }

    fn next_set(&mut self) -> Result<bool, DriverError> {
        if self.position + 1 < self.sets.len() {
            self.position += 1;
            self.state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .sets_visited += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_connect_failures_run_out() {
        let driver = MockDriver::new("mock")
            .with_connect_failures(vec![DriverError::operational("timeout")]);

        let attrs = PreAuthAttributes::new();
        assert!(driver.connect("x", Duration::ZERO, true, &attrs).is_err());
        assert!(driver.connect("x", Duration::ZERO, true, &attrs).is_ok());
        assert_eq!(driver.connect_calls().len(), 2);
    }

    #[test]
    fn cursor_walks_result_sets() {
        let driver = MockDriver::new("mock")
            .with_statement_set()
            .with_result_set(vec![vec![SqlValue::Int(1)]]);

        let mut conn = driver
            .connect("x", Duration::ZERO, true, &PreAuthAttributes::new())
            .unwrap();
        let mut cursor = conn.cursor().unwrap();
        cursor.execute("select 1", None).unwrap();

        assert!(!cursor.has_result_set());
        assert!(cursor.next_set().unwrap());
        assert_eq!(cursor.fetch_all().unwrap(), vec![vec![SqlValue::Int(1)]]);
        assert!(!cursor.next_set().unwrap());
        assert_eq!(driver.sets_visited(), 1);
    }

    #[test]
    fn clones_share_state() {
        let driver = MockDriver::new("mock");
        driver.clone().set_pooling(true, 10);
        assert_eq!(driver.pooling(), Some((true, 10)));
    }
}
