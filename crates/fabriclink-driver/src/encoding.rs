//! Byte layouts exchanged with the ODBC driver

use crate::driver::SqlValue;
use crate::error::DriverError;
use chrono::{FixedOffset, NaiveDate, TimeZone};

const DATETIMEOFFSET_LEN: usize = 20;

/// Length-prefixed wide-character encoding of a token
///
/// Every byte of the UTF-8 token is followed by a zero byte; the result is
/// prefixed with its own length as a little-endian `i32`.
pub fn encode_token_bytes(token: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(token.len() * 2);
    for byte in token.bytes() {
        encoded.push(byte);
        encoded.push(0);
    }

    let mut out = Vec::with_capacity(4 + encoded.len());
    out.extend_from_slice(&(encoded.len() as i32).to_le_bytes());
    out.extend_from_slice(&encoded);
    out
}

/// Alias used at the pre-connect attribute call site
pub fn encode_access_token(token: &str) -> Vec<u8> {
    encode_token_bytes(token)
}

/// Inverse of [`encode_token_bytes`]
pub fn decode_access_token(bytes: &[u8]) -> Result<String, DriverError> {
    let prefix: [u8; 4] = bytes
        .get(..4)
        .and_then(|p| p.try_into().ok())
        .ok_or_else(|| DriverError::interface("access token buffer shorter than its prefix"))?;
    let len = i32::from_le_bytes(prefix);

    let body = &bytes[4..];
    if len < 0 || len as usize != body.len() || body.len() % 2 != 0 {
        return Err(DriverError::interface(format!(
            "access token length prefix {} does not match {} payload bytes",
            len,
            body.len()
        )));
    }

    let raw: Vec<u8> = body.chunks_exact(2).map(|pair| pair[0]).collect();
    String::from_utf8(raw).map_err(|e| DriverError::interface(e.to_string()))
}

fn read_i16(bytes: &[u8], field: usize) -> i16 {
    let at = field * 2;
    i16::from_le_bytes([bytes[at], bytes[at + 1]])
}

/// Decode a DATETIMEOFFSET column buffer
///
/// Layout (little-endian): year, month, day, hour, minute, second as `i16`,
/// nanosecond fraction as `u32`, then offset hours and minutes as `i16`.
pub fn datetimeoffset_from_bytes(bytes: &[u8]) -> Result<chrono::DateTime<FixedOffset>, DriverError> {
    if bytes.len() != DATETIMEOFFSET_LEN {
        return Err(DriverError::new(
            crate::error::DriverErrorKind::Data,
            format!(
                "DATETIMEOFFSET buffer must be {} bytes, got {}",
                DATETIMEOFFSET_LEN,
                bytes.len()
            ),
        ));
    }

    let year = read_i16(bytes, 0);
    let month = read_i16(bytes, 1);
    let day = read_i16(bytes, 2);
    let hour = read_i16(bytes, 3);
    let minute = read_i16(bytes, 4);
    let second = read_i16(bytes, 5);
    let nanos = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
    let offset_hours = i32::from(i16::from_le_bytes([bytes[16], bytes[17]]));
    let offset_minutes = i32::from(i16::from_le_bytes([bytes[18], bytes[19]]));

    let invalid = || {
        DriverError::new(
            crate::error::DriverErrorKind::Data,
            format!(
                "invalid DATETIMEOFFSET {}-{}-{} {}:{}:{} {:+}:{}",
                year, month, day, hour, minute, second, offset_hours, offset_minutes
            ),
        )
    };

    let naive = NaiveDate::from_ymd_opt(year.into(), month as u32, day as u32)
        .and_then(|date| {
            date.and_hms_micro_opt(hour as u32, minute as u32, second as u32, nanos / 1000)
        })
        .ok_or_else(invalid)?;

    // Offset minutes carry the sign of the hours
    let offset = FixedOffset::east_opt((offset_hours * 60 + offset_minutes) * 60).ok_or_else(invalid)?;

    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(invalid)
}

/// Output converter registered for `SQL_SS_TIMESTAMPOFFSET` columns
pub fn convert_datetimeoffset(bytes: &[u8]) -> Result<SqlValue, DriverError> {
    datetimeoffset_from_bytes(bytes).map(SqlValue::DateTimeOffset)
}
