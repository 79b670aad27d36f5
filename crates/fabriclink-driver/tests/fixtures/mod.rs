//! Test fixtures for driver backend integration tests
//!
//! Profiles covering the authentication modes a warehouse target can use,
//! plus a registry holding both mock drivers.

use fabriclink_core::{AuthenticationMode, Credentials, TokenStrategy};
use fabriclink_driver::{BackendKind, DriverRegistry, MockDriver};
use std::sync::Arc;

pub const APP_NAME: &str = "fabriclink/0.1.0";

/// A service-principal profile
pub fn service_principal() -> Credentials {
    let mut creds = Credentials::new("abc.datawarehouse.fabric.microsoft.com", "sales", "dbo");
    creds.tenant_id = Some("tenant".to_string());
    creds.client_id = Some("11111111-2222-3333-4444-555555555555".to_string());
    creds.client_secret = Some("sp-secret".to_string());
    creds
}

/// A profile for every supported authentication mode
pub fn all_supported_profiles() -> Vec<Credentials> {
    let mut modes = vec![
        AuthenticationMode::ActiveDirectoryPassword,
        AuthenticationMode::ActiveDirectoryServicePrincipal,
        AuthenticationMode::ActiveDirectoryInteractive,
        AuthenticationMode::ActiveDirectoryAccessToken,
        AuthenticationMode::ActiveDirectory("ActiveDirectoryMsi".to_string()),
        AuthenticationMode::ActiveDirectory("ActiveDirectoryIntegrated".to_string()),
    ];
    modes.extend(TokenStrategy::ALL.iter().map(|s| AuthenticationMode::Token(*s)));

    let mut profiles: Vec<Credentials> = modes
        .into_iter()
        .map(|mode| service_principal().with_authentication(mode))
        .collect();

    let mut windows = service_principal();
    windows.windows_login = true;
    windows.authentication = AuthenticationMode::WindowsLogin;
    profiles.push(windows);

    profiles
}

/// Registry with both drivers, returning clones for inspection
pub fn registry_with_both() -> (DriverRegistry, MockDriver, MockDriver) {
    let native = MockDriver::new("native");
    let odbc = MockDriver::new("odbc");
    let registry = DriverRegistry::new()
        .with_driver(BackendKind::Native, Arc::new(native.clone()))
        .with_driver(BackendKind::Odbc, Arc::new(odbc.clone()));
    (registry, native, odbc)
}
