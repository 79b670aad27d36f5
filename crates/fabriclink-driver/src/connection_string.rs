//! Connection string construction
//!
//! Both backends emit semicolon-joined `key=value` pairs with the same
//! content: server, database, the authentication fields, encryption and
//! certificate-trust flags, application name and fixed retry parameters.
//! Only the ODBC flavour carries a `DRIVER={...}` prefix and braces around
//! UID/PWD.

use crate::error::DriverError;
use fabriclink_core::{AuthenticationMode, Credentials};

/// ODBC driver used when the profile names none
pub const DEFAULT_ODBC_DRIVER: &str = "ODBC Driver 18 for SQL Server";

const CONNECT_RETRY_COUNT: u32 = 3;
const CONNECT_RETRY_INTERVAL_SECS: u32 = 10;

/// Inputs for a connection string
#[derive(Debug, Clone)]
pub struct ConnectionStringParams<'a> {
    pub host: &'a str,
    pub database: &'a str,
    pub authentication: &'a AuthenticationMode,
    pub encrypt: bool,
    pub trust_cert: bool,
    pub application_name: &'a str,
    pub trace_flag: bool,
    pub driver: Option<&'a str>,
    pub uid: Option<&'a str>,
    pub pwd: Option<&'a str>,
    pub windows_login: bool,
}

impl<'a> ConnectionStringParams<'a> {
    /// Parameters from a profile plus the already-resolved UID/PWD
    pub fn from_credentials(
        credentials: &'a Credentials,
        application_name: &'a str,
        uid: Option<&'a str>,
        pwd: Option<&'a str>,
    ) -> Self {
        Self {
            host: &credentials.host,
            database: &credentials.database,
            authentication: &credentials.authentication,
            encrypt: credentials.encrypt,
            trust_cert: credentials.trust_cert,
            application_name,
            trace_flag: credentials.trace_flag,
            driver: credentials.driver.as_deref(),
            uid,
            pwd,
            windows_login: credentials.windows_login,
        }
    }

    fn reject_sql_auth(&self) -> Result<(), DriverError> {
        if !self.windows_login && *self.authentication == AuthenticationMode::Sql {
            return Err(DriverError::database(
                "SQL Authentication is not supported by Microsoft Fabric",
            ));
        }
        Ok(())
    }
}

fn yes_no(key: &str, value: bool) -> String {
    format!("{}={}", key, if value { "Yes" } else { "No" })
}

fn push_common_tail(parts: &mut Vec<String>, params: &ConnectionStringParams<'_>, encrypt_key: &str) {
    parts.push(yes_no(encrypt_key, params.encrypt));
    parts.push(yes_no("TrustServerCertificate", params.trust_cert));
    parts.push(format!("APP={}", params.application_name));
    parts.push(format!("ConnectRetryCount={}", CONNECT_RETRY_COUNT));
    parts.push(format!("ConnectRetryInterval={}", CONNECT_RETRY_INTERVAL_SECS));
}

/// Connection string for the native backend
pub(crate) fn build_native(params: &ConnectionStringParams<'_>) -> Result<String, DriverError> {
    params.reject_sql_auth()?;

    let mut parts = vec![
        format!("SERVER={}", params.host),
        format!("Database={}", params.database),
    ];

    let auth = params.authentication;
    if params.windows_login {
        parts.push("Trusted_Connection=Yes".to_string());
    } else if auth.emits_authentication_field() {
        parts.push(format!("Authentication={}", auth));
        if let Some(uid) = params.uid.filter(|_| auth.needs_login_hint()) {
            parts.push(format!("UID={}", uid));
        }
        if let Some(pwd) = params.pwd.filter(|_| auth.needs_secret()) {
            parts.push(format!("PWD={}", pwd));
        }
    }

    push_common_tail(&mut parts, params, "Encrypt");
    Ok(parts.join(";"))
}

/// Connection string for the ODBC backend
pub(crate) fn build_odbc(params: &ConnectionStringParams<'_>) -> Result<String, DriverError> {
    params.reject_sql_auth()?;

    let driver = params.driver.unwrap_or(DEFAULT_ODBC_DRIVER);
    let mut parts = vec![
        format!("DRIVER={{{}}}", driver),
        format!("SERVER={}", params.host),
        format!("Database={}", params.database),
        "Pooling=true".to_string(),
    ];

    if params.trace_flag {
        parts.push("SQL_ATTR_TRACE=SQL_OPT_TRACE_ON".to_string());
    } else {
        parts.push("SQL_ATTR_TRACE=SQL_OPT_TRACE_OFF".to_string());
    }

    let auth = params.authentication;
    if params.windows_login {
        parts.push("trusted_connection=Yes".to_string());
    } else if auth.emits_authentication_field() {
        parts.push(format!("Authentication={}", auth));
        if let Some(uid) = params.uid.filter(|_| auth.needs_login_hint()) {
            parts.push(format!("UID={{{}}}", uid));
        }
        if let Some(pwd) = params.pwd.filter(|_| auth.needs_secret()) {
            parts.push(format!("PWD={{{}}}", pwd));
        }
    }

    push_common_tail(&mut parts, params, "encrypt");
    Ok(parts.join(";"))
}

/// Display variant of a connection string with the secret masked
pub fn mask_secret(connection_string: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !secret.is_empty() => connection_string.replace(secret, "***"),
        _ => connection_string.to_string(),
    }
}
