//! Authentication errors

/// Errors acquiring a bearer token
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    /// Profile lacks what the authentication mode needs
    #[error("Authentication configuration error: {0}")]
    Config(String),

    /// A token source failed
    #[error("{provider} token provider failed: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// No provider registered for the strategy
    #[error("No token provider registered for '{0}'")]
    NoProvider(String),

    /// Mode has no way to obtain a control-plane token
    #[error("Authentication '{0}' cannot obtain a control-plane token")]
    Unsupported(String),
}

impl AuthError {
    pub(crate) fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }
}
