//! Access tokens and scopes

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Scope for native database authentication
pub const DATABASE_SCOPE: &str = "https://database.windows.net//.default";

/// Scope for the REST control plane
pub const CONTROL_PLANE_SCOPE: &str = "https://api.fabric.microsoft.com/.default";

/// Database resource as named inside a notebook runtime
pub const FABRIC_NOTEBOOK_SCOPE: &str = "https://database.windows.net/";

/// Database resource as named inside a Spark runtime
pub const SYNAPSE_SPARK_SCOPE: &str = "DW";

/// Lifetime assumed for tokens without an expiry (75 minutes)
pub const HOST_TOKEN_LIFETIME_SECS: i64 = 4500;

/// Current Unix time in seconds
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A bearer token and its Unix expiry
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: i64,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: i64) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// Token valid for `lifetime_secs` from now
    pub fn with_lifetime(token: impl Into<String>, lifetime_secs: i64) -> Self {
        Self::new(token, now_unix() + lifetime_secs)
    }

    /// Whether fewer than `margin_secs` remain before expiry
    pub fn expires_within(&self, margin_secs: i64, now: i64) -> bool {
        self.expires_on - now < margin_secs
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"***")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_check() {
        let token = AccessToken::new("t", 1_000);
        assert!(token.expires_within(300, 800));
        assert!(!token.expires_within(300, 600));
        assert!(token.expires_within(300, 2_000));
    }

    #[test]
    fn debug_never_prints_the_token() {
        let token = AccessToken::new("super-secret", 1);
        assert!(!format!("{:?}", token).contains("super-secret"));
    }
}
