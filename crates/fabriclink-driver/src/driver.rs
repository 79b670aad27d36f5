//! Opaque native driver surface
//!
//! The wire protocols live in the installed drivers; this module only names
//! the calls the connectivity layer makes on them.

use crate::error::DriverError;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use std::time::Duration;

/// Pre-connect attribute carrying a wide-character access token
pub const SQL_COPT_SS_ACCESS_TOKEN: i32 = 1256;

/// Type code of `DATETIMEOFFSET` result columns
pub const SQL_SS_TIMESTAMPOFFSET: i32 = -155;

/// A single bind parameter or output value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl SqlValue {
    /// Datetime parameters are sent as ISO-8601 text; some drivers reject
    /// datetime objects as bind parameters.
    pub fn into_bind_parameter(self) -> SqlValue {
        match self {
            SqlValue::DateTime(value) => SqlValue::Text(iso_format(&value, None)),
            SqlValue::DateTimeOffset(value) => {
                SqlValue::Text(iso_format(&value.naive_local(), Some(value.offset())))
            }
            other => other,
        }
    }
}

fn iso_format(value: &NaiveDateTime, offset: Option<&FixedOffset>) -> String {
    let mut text = if value.nanosecond() == 0 {
        value.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        value.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    };
    if let Some(offset) = offset {
        text.push_str(&offset.to_string());
    }
    text
}

/// One fetched row
pub type Row = Vec<SqlValue>;

/// Converts a raw column buffer of a registered type code
pub type OutputConverter = fn(&[u8]) -> Result<SqlValue, DriverError>;

/// Attributes applied before the login handshake, keyed by attribute id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreAuthAttributes(BTreeMap<i32, Vec<u8>>);

impl PreAuthAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes carrying an encoded access token
    pub fn access_token(encoded: Vec<u8>) -> Self {
        let mut attrs = Self::new();
        attrs.insert(SQL_COPT_SS_ACCESS_TOKEN, encoded);
        attrs
    }

    pub fn insert(&mut self, attribute: i32, value: Vec<u8>) {
        self.0.insert(attribute, value);
    }

    pub fn get(&self, attribute: i32) -> Option<&[u8]> {
        self.0.get(&attribute).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&i32, &Vec<u8>)> {
        self.0.iter()
    }
}

/// An installed native driver
pub trait NativeDriver: Send + Sync {
    /// Driver name for logs
    fn name(&self) -> &'static str;

    /// Runtime support probe; `Err` carries the reason the driver cannot run
    fn is_supported(&self) -> Result<(), String> {
        Ok(())
    }

    /// Open a connection
    fn connect(
        &self,
        connection_string: &str,
        timeout: Duration,
        autocommit: bool,
        attrs_before: &PreAuthAttributes,
    ) -> Result<Box<dyn DriverConnection>, DriverError>;

    /// Configure driver-level pooling
    fn set_pooling(&self, enabled: bool, max_size: usize);
}

/// An open native connection, owned by one worker while in use
pub trait DriverConnection: Send {
    fn set_query_timeout(&mut self, timeout: Duration);

    fn cursor(&mut self) -> Result<Box<dyn Cursor>, DriverError>;

    fn add_output_converter(&mut self, sql_type: i32, converter: OutputConverter);

    fn rollback(&mut self) -> Result<(), DriverError>;

    fn close(&mut self) -> Result<(), DriverError>;
}

/// Statement cursor
pub trait Cursor: Send {
    fn execute(&mut self, sql: &str, bindings: Option<&[SqlValue]>) -> Result<(), DriverError>;

    /// Rows affected by the last statement, -1 when unknown
    fn rowcount(&self) -> i64;

    /// Whether the current result set has columns
    fn has_result_set(&self) -> bool;

    fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError>;

    /// Advance to the next result set; `false` when there is none
    fn next_set(&mut self) -> Result<bool, DriverError>;
}
