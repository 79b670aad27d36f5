//! Per-worker connection state

use crate::error::ConnectionError;
use fabriclink_driver::{Cursor, DriverConnection, DriverError};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Opening,
    Open,
    Failed,
    /// Released after use or after an error
    Closed,
}

/// An open native connection and its query timeout
pub struct ConnectionHandle {
    inner: Box<dyn DriverConnection>,
    query_timeout: Duration,
}

impl ConnectionHandle {
    pub(crate) fn new(mut inner: Box<dyn DriverConnection>, query_timeout: Duration) -> Self {
        inner.set_query_timeout(query_timeout);
        Self {
            inner,
            query_timeout,
        }
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub fn cursor(&mut self) -> Result<Box<dyn Cursor>, DriverError> {
        self.inner.cursor()
    }

    pub fn driver_connection(&mut self) -> &mut dyn DriverConnection {
        self.inner.as_mut()
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.inner.rollback()
    }

    fn close(mut self) -> Result<(), DriverError> {
        self.inner.close()
    }
}

/// A named connection, owned by one worker while in use
pub struct Connection {
    name: String,
    state: ConnectionState,
    handle: Option<ConnectionHandle>,
}

impl Connection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ConnectionState::Unopened,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub(crate) fn attach(&mut self, handle: ConnectionHandle) {
        self.handle = Some(handle);
        self.state = ConnectionState::Open;
    }

    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.handle.as_ref()
    }

    /// The open handle, or a runtime error when there is none
    pub fn handle_mut(&mut self) -> Result<&mut ConnectionHandle, ConnectionError> {
        let name = &self.name;
        self.handle
            .as_mut()
            .ok_or_else(|| ConnectionError::Runtime(format!("Connection '{}' is not open", name)))
    }

    /// Roll back the open transaction, if any
    pub fn rollback(&mut self) -> Result<(), DriverError> {
        match self.handle.as_mut() {
            Some(handle) => handle.rollback(),
            None => Ok(()),
        }
    }

    /// Close the native handle
    pub fn release(&mut self) -> Result<(), DriverError> {
        self.state = ConnectionState::Closed;
        match self.handle.take() {
            Some(handle) => handle.close(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("query_timeout", &self.handle.as_ref().map(|h| h.query_timeout))
            .finish()
    }
}
