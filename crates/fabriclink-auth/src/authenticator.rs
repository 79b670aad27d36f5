//! Token authenticator context
//!
//! Owns the process-wide cached database token. The cache is only touched
//! through [`TokenAuthenticator::cached_token`], which refreshes under the
//! lock when the token is absent or close to expiry.

use crate::error::AuthError;
use crate::provider::{
    AzureCliProvider, DefaultChainProvider, EnvironmentProvider, ServicePrincipalProvider,
    TokenProvider,
};
use crate::token::{
    now_unix, AccessToken, CONTROL_PLANE_SCOPE, DATABASE_SCOPE, HOST_TOKEN_LIFETIME_SECS,
};
use fabriclink_core::{AuthenticationMode, Credentials, TokenStrategy};
use fabriclink_driver::{encode_access_token, DriverBackend, PreAuthAttributes};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Token acquisition and caching for one process
pub struct TokenAuthenticator {
    providers: HashMap<TokenStrategy, Arc<dyn TokenProvider>>,
    service_principal: Arc<dyn TokenProvider>,
    cached: Mutex<Option<Arc<AccessToken>>>,
}

impl Default for TokenAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenAuthenticator {
    /// Authenticator with the CLI, environment and default-chain providers
    ///
    /// Notebook and Spark providers need a host callback; register them with
    /// [`TokenAuthenticator::with_provider`].
    pub fn new() -> Self {
        Self::empty()
            .with_provider(TokenStrategy::Cli, Arc::new(AzureCliProvider::new()))
            .with_provider(TokenStrategy::Environment, Arc::new(EnvironmentProvider))
            .with_provider(TokenStrategy::Auto, Arc::new(DefaultChainProvider::default()))
    }

    /// Authenticator without any strategy providers
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
            service_principal: Arc::new(ServicePrincipalProvider),
            cached: Mutex::new(None),
        }
    }

    pub fn with_provider(
        mut self,
        strategy: TokenStrategy,
        provider: Arc<dyn TokenProvider>,
    ) -> Self {
        self.providers.insert(strategy, provider);
        self
    }

    /// Replace the source used for service-principal control-plane tokens
    pub fn with_service_principal_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.service_principal = provider;
        self
    }

    fn provider(&self, strategy: TokenStrategy) -> Result<&Arc<dyn TokenProvider>, AuthError> {
        self.providers
            .get(&strategy)
            .ok_or_else(|| AuthError::NoProvider(strategy.as_str().to_string()))
    }

    /// Cached database token for a strategy mode, refreshed when stale
    pub fn cached_token(
        &self,
        credentials: &Credentials,
        strategy: TokenStrategy,
    ) -> Result<Arc<AccessToken>, AuthError> {
        let margin = credentials.token_refresh_margin_secs as i64;
        let mut cached = self.cache();

        if let Some(token) = cached.as_ref() {
            if !token.expires_within(margin, now_unix()) {
                return Ok(Arc::clone(token));
            }
            debug!(expires_on = token.expires_on, "Cached token is near expiry");
        }

        let provider = self.provider(strategy)?;
        let token = Arc::new(provider.get_token(credentials, DATABASE_SCOPE)?);
        info!(
            provider = provider.name(),
            expires_on = token.expires_on,
            "Acquired database token"
        );

        *cached = Some(Arc::clone(&token));
        Ok(token)
    }

    /// Drop the cached token
    pub fn clear(&self) {
        *self.cache() = None;
    }

    /// A panicked refresh leaves the previous token in place
    fn cache(&self) -> MutexGuard<'_, Option<Arc<AccessToken>>> {
        self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pre-connect attributes for a backend
    ///
    /// Empty when the backend carries authentication in the connection
    /// string, or when the mode needs no bearer token.
    pub fn pre_auth_attributes(
        &self,
        credentials: &Credentials,
        backend: &DriverBackend,
    ) -> Result<PreAuthAttributes, AuthError> {
        if !backend.requires_token_bytes() {
            return Ok(PreAuthAttributes::new());
        }

        match &credentials.authentication {
            AuthenticationMode::Token(strategy) => {
                let token = self.cached_token(credentials, *strategy)?;
                Ok(PreAuthAttributes::access_token(encode_access_token(&token.token)))
            }
            AuthenticationMode::ActiveDirectoryAccessToken => {
                let token = static_token(credentials)?;
                Ok(PreAuthAttributes::access_token(encode_access_token(&token.token)))
            }
            _ => Ok(PreAuthAttributes::new()),
        }
    }

    /// Bearer token for the REST control plane
    ///
    /// Not cached: it is requested once per run.
    pub fn control_plane_token(&self, credentials: &Credentials) -> Result<String, AuthError> {
        match &credentials.authentication {
            AuthenticationMode::Token(strategy) => Ok(self
                .provider(*strategy)?
                .get_token(credentials, CONTROL_PLANE_SCOPE)?
                .token),
            AuthenticationMode::ActiveDirectoryAccessToken => Ok(static_token(credentials)?.token),
            AuthenticationMode::ActiveDirectoryServicePrincipal => Ok(self
                .service_principal
                .get_token(credentials, CONTROL_PLANE_SCOPE)?
                .token),
            other => Err(AuthError::Unsupported(other.to_string())),
        }
    }
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut strategies: Vec<_> = self.providers.keys().map(|s| s.as_str()).collect();
        strategies.sort_unstable();
        f.debug_struct("TokenAuthenticator")
            .field("providers", &strategies)
            .finish_non_exhaustive()
    }
}

/// Static token from the profile; expiry 0 means 75 minutes from now
fn static_token(credentials: &Credentials) -> Result<AccessToken, AuthError> {
    match (&credentials.access_token, credentials.access_token_expires_on) {
        (Some(token), Some(0)) => Ok(AccessToken::with_lifetime(
            token.clone(),
            HOST_TOKEN_LIFETIME_SECS,
        )),
        (Some(token), Some(expires_on)) => Ok(AccessToken::new(token.clone(), expires_on)),
        _ => Err(AuthError::Config(
            "Access token and access token expiry are required for \
             ActiveDirectoryAccessToken authentication."
                .to_string(),
        )),
    }
}
