//! Connection profile (profiles.toml)
//!
//! The credentials record carries everything the connectivity layer needs to
//! reach the warehouse: endpoint, authentication mode and secrets, retry and
//! timeout settings, and the optional workspace/snapshot pair used by the
//! snapshot orchestration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default base URL of the REST control plane
pub const DEFAULT_API_URL: &str = "https://api.fabric.microsoft.com/v1";

/// Environment variable that overrides the profile's `driver_backend`
pub const DRIVER_BACKEND_ENV: &str = "FABRIC_DRIVER_BACKEND";

/// Which native driver backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverPreference {
    /// Prefer the native backend, fall back to ODBC
    Auto,

    /// Native driver; authentication travels in the connection string
    Native,

    /// ODBC driver; tokens are passed out of band as pre-connect attributes
    Odbc,
}

impl DriverPreference {
    /// Accepted spellings, in display order
    pub const VALID: &'static [&'static str] = &["auto", "native", "odbc"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Native => "native",
            Self::Odbc => "odbc",
        }
    }
}

impl Default for DriverPreference {
    fn default() -> Self {
        Self::Auto
    }
}

impl fmt::Display for DriverPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "native" => Ok(Self::Native),
            "odbc" => Ok(Self::Odbc),
            other => Err(ConfigError::Invalid(format!(
                "Invalid driver_backend='{}'. Valid values: {}",
                other,
                Self::VALID.join(", ")
            ))),
        }
    }
}

/// Token acquisition strategies that hand the driver a bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenStrategy {
    /// Azure CLI login (`az login`)
    Cli,

    /// Environment credential, then CLI
    Auto,

    /// Client-credentials grant from `AZURE_*` environment variables
    Environment,

    /// Token supplied by a Synapse Spark compute host
    SynapseSpark,

    /// Token supplied by a Fabric notebook host
    FabricNotebook,
}

impl TokenStrategy {
    pub const ALL: [TokenStrategy; 5] = [
        Self::Cli,
        Self::Auto,
        Self::Environment,
        Self::SynapseSpark,
        Self::FabricNotebook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Auto => "auto",
            Self::Environment => "environment",
            Self::SynapseSpark => "synapsespark",
            Self::FabricNotebook => "fabricnotebook",
        }
    }
}

/// Authentication mode of a profile
///
/// Parsing is case-insensitive. `ActiveDirectory*` modes without dedicated
/// handling keep their original spelling so they can be handed to the driver
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuthenticationMode {
    /// SQL username/password; always rejected by the service
    Sql,

    /// Integrated Windows login
    WindowsLogin,

    ActiveDirectoryPassword,
    ActiveDirectoryServicePrincipal,
    ActiveDirectoryInteractive,

    /// Static bearer token supplied in the profile
    ActiveDirectoryAccessToken,

    /// Any other `ActiveDirectory*` mode (Msi, Integrated, Default, ...)
    ActiveDirectory(String),

    /// Token fetched by a [`TokenStrategy`]
    Token(TokenStrategy),
}

impl AuthenticationMode {
    /// Canonical spelling
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sql => "sql",
            Self::WindowsLogin => "Windows Login",
            Self::ActiveDirectoryPassword => "ActiveDirectoryPassword",
            Self::ActiveDirectoryServicePrincipal => "ActiveDirectoryServicePrincipal",
            Self::ActiveDirectoryInteractive => "ActiveDirectoryInteractive",
            Self::ActiveDirectoryAccessToken => "ActiveDirectoryAccessToken",
            Self::ActiveDirectory(name) => name,
            Self::Token(strategy) => strategy.as_str(),
        }
    }

    /// Modes that emit an `Authentication=` field in the connection string
    pub fn emits_authentication_field(&self) -> bool {
        matches!(
            self,
            Self::ActiveDirectoryPassword
                | Self::ActiveDirectoryServicePrincipal
                | Self::ActiveDirectoryInteractive
                | Self::ActiveDirectory(_)
        )
    }

    /// Modes that send a login hint (UID)
    pub fn needs_login_hint(&self) -> bool {
        matches!(
            self,
            Self::ActiveDirectoryPassword
                | Self::ActiveDirectoryServicePrincipal
                | Self::ActiveDirectoryInteractive
        )
    }

    /// Modes that send a secret (PWD)
    pub fn needs_secret(&self) -> bool {
        matches!(
            self,
            Self::ActiveDirectoryPassword | Self::ActiveDirectoryServicePrincipal
        )
    }

    pub fn token_strategy(&self) -> Option<TokenStrategy> {
        match self {
            Self::Token(strategy) => Some(*strategy),
            _ => None,
        }
    }
}

impl fmt::Display for AuthenticationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthenticationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_lowercase();

        if let Some(strategy) = TokenStrategy::ALL.iter().find(|t| t.as_str() == lower) {
            return Ok(Self::Token(*strategy));
        }

        match lower.as_str() {
            "sql" => Ok(Self::Sql),
            "windows login" | "windowslogin" => Ok(Self::WindowsLogin),
            "serviceprincipal" | "activedirectoryserviceprincipal" => {
                Ok(Self::ActiveDirectoryServicePrincipal)
            }
            "activedirectorypassword" => Ok(Self::ActiveDirectoryPassword),
            "activedirectoryinteractive" => Ok(Self::ActiveDirectoryInteractive),
            "activedirectoryaccesstoken" => Ok(Self::ActiveDirectoryAccessToken),
            _ if lower.starts_with("activedirectory") => {
                Ok(Self::ActiveDirectory(trimmed.to_string()))
            }
            _ => Err(ConfigError::Invalid(format!(
                "Unsupported authentication '{}'",
                trimmed
            ))),
        }
    }
}

impl TryFrom<String> for AuthenticationMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AuthenticationMode> for String {
    fn from(mode: AuthenticationMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Credentials for one warehouse target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Warehouse SQL endpoint
    #[serde(alias = "server")]
    pub host: String,

    /// Warehouse (database) name
    pub database: String,

    /// Default schema
    pub schema: String,

    /// Driver backend preference, overridable via `FABRIC_DRIVER_BACKEND`
    #[serde(default)]
    pub driver_backend: DriverPreference,

    /// ODBC driver name; ignored by the native backend
    #[serde(default)]
    pub driver: Option<String>,

    #[serde(default, alias = "UID", alias = "user", alias = "username")]
    pub uid: Option<String>,

    #[serde(default, alias = "PWD", alias = "pass", alias = "password")]
    pub pwd: Option<String>,

    #[serde(default, alias = "trusted_connection")]
    pub windows_login: bool,

    #[serde(default, alias = "SQL_ATTR_TRACE")]
    pub trace_flag: bool,

    #[serde(default)]
    pub tenant_id: Option<String>,

    #[serde(default, alias = "app_id")]
    pub client_id: Option<String>,

    #[serde(default, alias = "app_secret")]
    pub client_secret: Option<String>,

    /// Static bearer token for `ActiveDirectoryAccessToken`
    #[serde(default)]
    pub access_token: Option<String>,

    /// Unix expiry of `access_token`; 0 means "75 minutes from now"
    #[serde(default = "default_access_token_expires_on")]
    pub access_token_expires_on: Option<i64>,

    #[serde(default = "default_authentication", alias = "auth")]
    pub authentication: AuthenticationMode,

    #[serde(default = "default_true")]
    pub encrypt: bool,

    #[serde(default, alias = "TrustServerCertificate")]
    pub trust_cert: bool,

    /// Connection attempts (and minimum query retry limit)
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default, alias = "schema_auth")]
    pub schema_authorization: Option<String>,

    /// Login timeout in seconds (0 = driver default)
    #[serde(default)]
    pub login_timeout: u64,

    /// Query timeout in seconds (0 = no timeout)
    #[serde(default)]
    pub query_timeout: u64,

    #[serde(default)]
    pub workspace_id: Option<String>,

    #[serde(default)]
    pub warehouse_snapshot_name: Option<String>,

    #[serde(default)]
    pub warehouse_snapshot_id: Option<String>,

    #[serde(default)]
    pub snapshot_timestamp: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Enable driver-level connection pooling
    #[serde(default = "default_true")]
    pub pooling: bool,

    /// Cached tokens closer than this to expiry are refreshed
    #[serde(default = "default_token_refresh_margin_secs")]
    pub token_refresh_margin_secs: u64,

    /// Poll attempts for long-running snapshot operations
    #[serde(default = "default_snapshot_poll_max_retries")]
    pub snapshot_poll_max_retries: u32,

    /// Delay between polls when the service sends no `Retry-After`
    #[serde(default = "default_snapshot_poll_delay_secs")]
    pub snapshot_poll_delay_secs: u64,
}

fn default_access_token_expires_on() -> Option<i64> {
    Some(0)
}

fn default_authentication() -> AuthenticationMode {
    AuthenticationMode::ActiveDirectoryServicePrincipal
}

fn default_true() -> bool {
    true
}

fn default_retries() -> u32 {
    3
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_token_refresh_margin_secs() -> u64 {
    300
}

fn default_snapshot_poll_max_retries() -> u32 {
    5
}

fn default_snapshot_poll_delay_secs() -> u64 {
    30
}

impl Credentials {
    /// Create credentials with every optional setting at its default
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            schema: schema.into(),
            driver_backend: DriverPreference::default(),
            driver: None,
            uid: None,
            pwd: None,
            windows_login: false,
            trace_flag: false,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            access_token: None,
            access_token_expires_on: default_access_token_expires_on(),
            authentication: default_authentication(),
            encrypt: true,
            trust_cert: false,
            retries: default_retries(),
            schema_authorization: None,
            login_timeout: 0,
            query_timeout: 0,
            workspace_id: None,
            warehouse_snapshot_name: None,
            warehouse_snapshot_id: None,
            snapshot_timestamp: None,
            api_url: default_api_url(),
            pooling: true,
            token_refresh_margin_secs: default_token_refresh_margin_secs(),
            snapshot_poll_max_retries: default_snapshot_poll_max_retries(),
            snapshot_poll_delay_secs: default_snapshot_poll_delay_secs(),
        }
    }

    pub fn with_authentication(mut self, authentication: AuthenticationMode) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn with_snapshot(
        mut self,
        workspace_id: impl Into<String>,
        snapshot_name: impl Into<String>,
    ) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self.warehouse_snapshot_name = Some(snapshot_name.into());
        self
    }

    /// Load and validate a profile from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate a profile from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut credentials: Credentials = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        credentials.validate()?;
        Ok(credentials)
    }

    /// Save the profile to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Normalize the authentication mode and check field combinations
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::MissingField("database"));
        }

        if self.windows_login {
            self.authentication = AuthenticationMode::WindowsLogin;
        }

        self.validate_snapshot_properties()
    }

    /// `workspace_id` and `warehouse_snapshot_name` come as a pair
    pub fn validate_snapshot_properties(&self) -> Result<(), ConfigError> {
        if self.workspace_id.is_some() != self.warehouse_snapshot_name.is_some() {
            return Err(ConfigError::Invalid(
                "Both workspace_id and warehouse_snapshot_name must be provided together, \
                 or both must be omitted"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Keys shown by the debug command; secrets are never listed
    pub fn connection_keys() -> &'static [&'static str] {
        &[
            "server",
            "database",
            "schema",
            "warehouse_snapshot_name",
            "snapshot_timestamp",
            "UID",
            "workspace_id",
            "authentication",
            "retries",
            "login_timeout",
            "query_timeout",
            "trace_flag",
            "encrypt",
            "trust_cert",
            "api_url",
        ]
    }

    /// Display value for one of [`Credentials::connection_keys`]
    pub fn connection_value(&self, key: &str) -> Option<String> {
        match key {
            "server" => Some(self.host.clone()),
            "database" => Some(self.database.clone()),
            "schema" => Some(self.schema.clone()),
            "warehouse_snapshot_name" => self.warehouse_snapshot_name.clone(),
            "snapshot_timestamp" => self.snapshot_timestamp.clone(),
            "UID" => self.uid.clone(),
            "workspace_id" => self.workspace_id.clone(),
            "authentication" => Some(self.authentication.to_string()),
            "retries" => Some(self.retries.to_string()),
            "login_timeout" => Some(self.login_timeout.to_string()),
            "query_timeout" => Some(self.query_timeout.to_string()),
            "trace_flag" => Some(self.trace_flag.to_string()),
            "encrypt" => Some(self.encrypt.to_string()),
            "trust_cert" => Some(self.trust_cert.to_string()),
            "api_url" => Some(self.api_url.clone()),
            _ => None,
        }
    }

    /// Adapter type name
    pub fn type_name(&self) -> &'static str {
        "fabric"
    }

    /// Field that identifies the target for connection reuse
    pub fn unique_field(&self) -> &str {
        &self.host
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }

    pub fn snapshot_poll_delay(&self) -> Duration {
        Duration::from_secs(self.snapshot_poll_delay_secs)
    }
}

/// Config error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"
        host = "abc.datawarehouse.fabric.microsoft.com"
        database = "sales"
        schema = "dbo"
    "#;

    #[test]
    fn minimal_profile_uses_defaults() {
        let creds = Credentials::from_toml(MINIMAL).unwrap();

        assert_eq!(creds.driver_backend, DriverPreference::Auto);
        assert_eq!(
            creds.authentication,
            AuthenticationMode::ActiveDirectoryServicePrincipal
        );
        assert!(creds.encrypt);
        assert!(!creds.trust_cert);
        assert_eq!(creds.retries, 3);
        assert_eq!(creds.access_token_expires_on, Some(0));
        assert_eq!(creds.api_url, DEFAULT_API_URL);
        assert_eq!(creds.token_refresh_margin_secs, 300);
        assert_eq!(creds.snapshot_poll_max_retries, 5);
        assert_eq!(creds.snapshot_poll_delay_secs, 30);
    }

    #[test]
    fn aliases_are_accepted() {
        let creds = Credentials::from_toml(
            r#"
            server = "host"
            database = "db"
            schema = "dbo"
            user = "alice@contoso.com"
            password = "hunter2"
            auth = "ActiveDirectoryPassword"
            TrustServerCertificate = true
            app_id = "client"
            app_secret = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(creds.host, "host");
        assert_eq!(creds.uid.as_deref(), Some("alice@contoso.com"));
        assert_eq!(creds.pwd.as_deref(), Some("hunter2"));
        assert_eq!(creds.authentication, AuthenticationMode::ActiveDirectoryPassword);
        assert!(creds.trust_cert);
        assert_eq!(creds.client_id.as_deref(), Some("client"));
        assert_eq!(creds.client_secret.as_deref(), Some("secret"));
    }

    #[test]
    fn windows_login_overrides_authentication() {
        let toml = format!("{}\nwindows_login = true", MINIMAL);
        let creds = Credentials::from_toml(&toml).unwrap();
        assert_eq!(creds.authentication, AuthenticationMode::WindowsLogin);
    }

    #[test]
    fn snapshot_fields_must_be_paired() {
        let toml = format!("{}\nworkspace_id = \"ws\"", MINIMAL);
        let err = Credentials::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let toml = format!("{}\nwarehouse_snapshot_name = \"snap\"", MINIMAL);
        assert!(Credentials::from_toml(&toml).is_err());

        let toml = format!(
            "{}\nworkspace_id = \"ws\"\nwarehouse_snapshot_name = \"snap\"",
            MINIMAL
        );
        assert!(Credentials::from_toml(&toml).is_ok());
    }

    #[test]
    fn missing_host_is_rejected() {
        let err = Credentials::new("", "db", "dbo").validate().unwrap_err();
        assert_eq!(err, ConfigError::MissingField("host"));
    }

    #[test]
    fn invalid_driver_backend_fails_to_parse() {
        let toml = format!("{}\ndriver_backend = \"jdbc\"", MINIMAL);
        assert!(matches!(
            Credentials::from_toml(&toml),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn authentication_parsing() {
        let parse = |s: &str| s.parse::<AuthenticationMode>().unwrap();

        assert_eq!(parse("SQL"), AuthenticationMode::Sql);
        assert_eq!(parse("serviceprincipal"), AuthenticationMode::ActiveDirectoryServicePrincipal);
        assert_eq!(parse("CLI"), AuthenticationMode::Token(TokenStrategy::Cli));
        assert_eq!(
            parse("FabricNotebook"),
            AuthenticationMode::Token(TokenStrategy::FabricNotebook)
        );
        assert_eq!(
            parse("activedirectoryaccesstoken"),
            AuthenticationMode::ActiveDirectoryAccessToken
        );
        assert_eq!(
            parse("ActiveDirectoryMsi"),
            AuthenticationMode::ActiveDirectory("ActiveDirectoryMsi".to_string())
        );
        assert!("kerberos".parse::<AuthenticationMode>().is_err());
    }

    #[test]
    fn authentication_field_rules() {
        use AuthenticationMode::*;

        assert!(ActiveDirectoryPassword.needs_secret());
        assert!(ActiveDirectoryInteractive.needs_login_hint());
        assert!(!ActiveDirectoryInteractive.needs_secret());
        assert!(!ActiveDirectoryAccessToken.emits_authentication_field());
        assert!(ActiveDirectory("ActiveDirectoryMsi".into()).emits_authentication_field());
        assert!(!Token(TokenStrategy::Cli).emits_authentication_field());
    }

    #[test]
    fn driver_preference_parsing() {
        assert_eq!("odbc".parse::<DriverPreference>().unwrap(), DriverPreference::Odbc);
        let err = "ODBC".parse::<DriverPreference>().unwrap_err();
        assert!(err.to_string().contains("Valid values: auto, native, odbc"));
    }

    #[test]
    fn connection_keys_never_expose_secrets() {
        let mut creds = Credentials::new("h", "d", "s");
        creds.pwd = Some("hunter2".into());

        for key in Credentials::connection_keys() {
            assert_ne!(creds.connection_value(key).as_deref(), Some("hunter2"));
        }
        assert_eq!(creds.connection_value("server").as_deref(), Some("h"));
    }

    #[test]
    fn profile_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");

        let creds = Credentials::new("h", "d", "s")
            .with_authentication(AuthenticationMode::Token(TokenStrategy::Cli))
            .with_snapshot("ws", "nightly");
        creds.save_to_file(&path).unwrap();

        let loaded = Credentials::from_file(&path).unwrap();
        assert_eq!(loaded, creds);
    }
}
