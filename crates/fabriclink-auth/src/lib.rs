//! Bearer token acquisition for warehouse and control-plane access
//!
//! [`TokenAuthenticator`] is the context object that owns the cached
//! database token. Token sources implement [`TokenProvider`]:
//!
//! - `cli` - the Azure CLI
//! - `environment` - client-credentials grant from `AZURE_*` variables
//! - `auto` - environment, then CLI
//! - `fabricnotebook` / `synapsespark` - tokens handed over by the host runtime

pub mod error;
pub mod token;
pub mod provider;
pub mod authenticator;

pub use error::AuthError;
pub use token::{
    now_unix, AccessToken, CONTROL_PLANE_SCOPE, DATABASE_SCOPE, FABRIC_NOTEBOOK_SCOPE,
    HOST_TOKEN_LIFETIME_SECS, SYNAPSE_SPARK_SCOPE,
};
pub use provider::{
    AzureCliProvider, ClientSecretCredential, DefaultChainProvider, EnvironmentProvider,
    HostTokenFn, HostTokenProvider, ServicePrincipalProvider, TokenProvider,
};
pub use authenticator::TokenAuthenticator;
