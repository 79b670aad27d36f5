//! Token sources

use crate::error::AuthError;
use crate::token::{
    now_unix, AccessToken, DATABASE_SCOPE, FABRIC_NOTEBOOK_SCOPE, HOST_TOKEN_LIFETIME_SECS,
    SYNAPSE_SPARK_SCOPE,
};
use chrono::{Local, NaiveDateTime, TimeZone};
use fabriclink_core::Credentials;
use serde::Deserialize;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// A source of bearer tokens
pub trait TokenProvider: Send + Sync {
    /// Provider name for logs and errors
    fn name(&self) -> &'static str;

    /// Fetch a token for `scope`
    fn get_token(&self, credentials: &Credentials, scope: &str) -> Result<AccessToken, AuthError>;
}

// =============================================================================
// Azure CLI
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenOutput {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    /// Unix expiry, only emitted by newer CLI releases
    #[serde(default, rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

/// Tokens from `az account get-access-token`
#[derive(Debug, Clone)]
pub struct AzureCliProvider {
    program: String,
}

impl Default for AzureCliProvider {
    fn default() -> Self {
        let program = if cfg!(windows) { "az.cmd" } else { "az" };
        Self {
            program: program.to_string(),
        }
    }
}

impl AzureCliProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Parse the JSON the CLI prints
    pub fn parse_output(stdout: &str) -> Result<AccessToken, AuthError> {
        let output: CliTokenOutput = serde_json::from_str(stdout)
            .map_err(|e| AuthError::provider("cli", format!("unexpected output: {}", e)))?;

        let expires_on = match (output.expires_on_unix, output.expires_on.as_deref()) {
            (Some(unix), _) => unix,
            (None, Some(local)) => parse_local_expiry(local)?,
            (None, None) => return Err(AuthError::provider("cli", "output has no expiry")),
        };

        Ok(AccessToken::new(output.access_token, expires_on))
    }
}

fn parse_local_expiry(value: &str) -> Result<i64, AuthError> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| AuthError::provider("cli", format!("invalid expiresOn '{}': {}", value, e)))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| AuthError::provider("cli", format!("ambiguous expiresOn '{}'", value)))
}

impl TokenProvider for AzureCliProvider {
    fn name(&self) -> &'static str {
        "cli"
    }

    fn get_token(&self, credentials: &Credentials, scope: &str) -> Result<AccessToken, AuthError> {
        let mut command = Command::new(&self.program);
        command.args(["account", "get-access-token", "--output", "json", "--scope", scope]);
        if let Some(tenant) = &credentials.tenant_id {
            command.args(["--tenant", tenant.as_str()]);
        }

        debug!(scope, "Requesting token from Azure CLI");
        let output = command.output().map_err(|e| {
            AuthError::provider("cli", format!("failed to run {}: {}", self.program, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuthError::provider("cli", stderr.trim().to_string()));
        }

        Self::parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

// =============================================================================
// Client credentials
// =============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// OAuth2 client-credentials grant against the identity platform
#[derive(Clone)]
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority: String,
    timeout: Option<Duration>,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority: AUTHORITY_HOST.to_string(),
            timeout: None,
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    /// Request timeout; zero means none
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id)
    }

    /// Parse a token endpoint response body
    pub fn parse_response(body: &str, now: i64) -> Result<AccessToken, AuthError> {
        let response: TokenResponse = serde_json::from_str(body).map_err(|e| {
            AuthError::provider("client_secret", format!("unexpected response: {}", e))
        })?;
        Ok(AccessToken::new(response.access_token, now + response.expires_in))
    }

    pub fn request_token(&self, scope: &str) -> Result<AccessToken, AuthError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AuthError::provider("client_secret", e.to_string()))?;

        debug!(tenant = %self.tenant_id, scope, "Requesting client-credentials token");
        let response = client
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .map_err(|e| AuthError::provider("client_secret", e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| AuthError::provider("client_secret", e.to_string()))?;

        if !status.is_success() {
            return Err(AuthError::provider(
                "client_secret",
                format!("token endpoint returned {}: {}", status, body),
            ));
        }

        Self::parse_response(&body, now_unix())
    }
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

/// Client-credentials grant from the profile's tenant, client id and secret
#[derive(Debug, Clone, Default)]
pub struct ServicePrincipalProvider;

impl ServicePrincipalProvider {
    pub fn credential(credentials: &Credentials) -> Result<ClientSecretCredential, AuthError> {
        let field = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| {
                    AuthError::Config(format!(
                        "{} is required for service principal authentication",
                        name
                    ))
                })
        };

        Ok(ClientSecretCredential::new(
            field(&credentials.tenant_id, "tenant_id")?,
            field(&credentials.client_id, "client_id")?,
            field(&credentials.client_secret, "client_secret")?,
        )
        .with_timeout(credentials.login_timeout()))
    }
}

impl TokenProvider for ServicePrincipalProvider {
    fn name(&self) -> &'static str {
        "service_principal"
    }

    fn get_token(&self, credentials: &Credentials, scope: &str) -> Result<AccessToken, AuthError> {
        Self::credential(credentials)?.request_token(scope)
    }
}

// =============================================================================
// Environment
// =============================================================================

/// Client-credentials grant from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
/// `AZURE_CLIENT_SECRET`
#[derive(Debug, Clone, Default)]
pub struct EnvironmentProvider;

impl EnvironmentProvider {
    pub const TENANT_ID: &'static str = "AZURE_TENANT_ID";
    pub const CLIENT_ID: &'static str = "AZURE_CLIENT_ID";
    pub const CLIENT_SECRET: &'static str = "AZURE_CLIENT_SECRET";
    pub const AUTHORITY_HOST: &'static str = "AZURE_AUTHORITY_HOST";

    /// Build the credential from a variable lookup
    pub fn credential_from<F>(lookup: F) -> Result<ClientSecretCredential, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AuthError::provider("environment", format!("{} is not set", name)))
        };

        let credential = ClientSecretCredential::new(
            required(Self::TENANT_ID)?,
            required(Self::CLIENT_ID)?,
            required(Self::CLIENT_SECRET)?,
        );

        Ok(match lookup(Self::AUTHORITY_HOST) {
            Some(authority) if !authority.is_empty() => credential.with_authority(authority),
            _ => credential,
        })
    }
}

impl TokenProvider for EnvironmentProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn get_token(&self, credentials: &Credentials, scope: &str) -> Result<AccessToken, AuthError> {
        Self::credential_from(|name| std::env::var(name).ok())?
            .with_timeout(credentials.login_timeout())
            .request_token(scope)
    }
}

// =============================================================================
// Default chain
// =============================================================================

/// Tries each provider in order, returning the first token
pub struct DefaultChainProvider {
    providers: Vec<Arc<dyn TokenProvider>>,
}

impl Default for DefaultChainProvider {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(EnvironmentProvider),
            Arc::new(AzureCliProvider::new()),
        ])
    }
}

impl DefaultChainProvider {
    pub fn new(providers: Vec<Arc<dyn TokenProvider>>) -> Self {
        Self { providers }
    }
}

impl TokenProvider for DefaultChainProvider {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn get_token(&self, credentials: &Credentials, scope: &str) -> Result<AccessToken, AuthError> {
        let mut failures = Vec::new();

        for provider in &self.providers {
            match provider.get_token(credentials, scope) {
                Ok(token) => {
                    debug!(provider = provider.name(), "Token acquired");
                    return Ok(token);
                }
                Err(e) => {
                    debug!(provider = provider.name(), error = %e, "Token provider unavailable");
                    failures.push(e.to_string());
                }
            }
        }

        warn!("No token provider in the default chain succeeded");
        Err(AuthError::provider("auto", failures.join("; ")))
    }
}

// =============================================================================
// Host runtimes
// =============================================================================

/// Callback into the host runtime's credential utility, given a resource name
pub type HostTokenFn = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// Token from a notebook or Spark host runtime
///
/// The host returns a bare token without expiry; it is assumed valid for
/// [`HOST_TOKEN_LIFETIME_SECS`]. Requests for the database scope are
/// translated to the runtime's own name for the database resource.
#[derive(Clone)]
pub struct HostTokenProvider {
    name: &'static str,
    database_resource: &'static str,
    fetch: HostTokenFn,
}

impl HostTokenProvider {
    pub fn fabric_notebook(fetch: HostTokenFn) -> Self {
        Self {
            name: "fabricnotebook",
            database_resource: FABRIC_NOTEBOOK_SCOPE,
            fetch,
        }
    }

    pub fn synapse_spark(fetch: HostTokenFn) -> Self {
        Self {
            name: "synapsespark",
            database_resource: SYNAPSE_SPARK_SCOPE,
            fetch,
        }
    }

    fn resource_for<'a>(&self, scope: &'a str) -> &'a str {
        if scope == DATABASE_SCOPE {
            self.database_resource
        } else {
            scope
        }
    }
}

impl TokenProvider for HostTokenProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn get_token(&self, _credentials: &Credentials, scope: &str) -> Result<AccessToken, AuthError> {
        let token = (self.fetch)(self.resource_for(scope))
            .map_err(|message| AuthError::provider(self.name, message))?;
        Ok(AccessToken::with_lifetime(token, HOST_TOKEN_LIFETIME_SECS))
    }
}
