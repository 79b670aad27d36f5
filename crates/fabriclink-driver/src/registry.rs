//! Backend resolution
//!
//! [`resolve_backend`] is the only place driver availability is probed. The
//! host registers the native drivers it has installed; a registered driver
//! may still report an unsupported runtime.

use crate::backend::{BackendKind, DriverBackend};
use crate::driver::NativeDriver;
use crate::error::BackendError;
use fabriclink_core::{ConfigError, DriverPreference, DRIVER_BACKEND_ENV};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Native drivers installed in the host process
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<BackendKind, Arc<dyn NativeDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: BackendKind, driver: Arc<dyn NativeDriver>) {
        self.drivers.insert(kind, driver);
    }

    pub fn with_driver(mut self, kind: BackendKind, driver: Arc<dyn NativeDriver>) -> Self {
        self.register(kind, driver);
        self
    }

    /// Probe one backend kind
    fn probe(&self, kind: BackendKind) -> Result<DriverBackend, BackendError> {
        let driver = self
            .drivers
            .get(&kind)
            .ok_or_else(|| BackendError::Unavailable {
                backend: kind,
                reason: "driver is not installed".to_string(),
            })?;

        driver
            .is_supported()
            .map_err(|reason| BackendError::Unavailable {
                backend: kind,
                reason,
            })?;

        Ok(match kind {
            BackendKind::Native => DriverBackend::native(Arc::clone(driver)),
            BackendKind::Odbc => DriverBackend::odbc(Arc::clone(driver)),
        })
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.drivers.keys().map(BackendKind::name).collect();
        kinds.sort_unstable();
        f.debug_struct("DriverRegistry").field("drivers", &kinds).finish()
    }
}

/// Resolve a preference to a concrete backend
///
/// `auto` tries the native backend first and falls back to ODBC; explicit
/// preferences fail when their driver is unavailable.
pub fn resolve_backend(
    preference: DriverPreference,
    registry: &DriverRegistry,
) -> Result<DriverBackend, BackendError> {
    match preference {
        DriverPreference::Native => registry.probe(BackendKind::Native),
        DriverPreference::Odbc => registry.probe(BackendKind::Odbc),
        DriverPreference::Auto => match registry.probe(BackendKind::Native) {
            Ok(backend) => {
                info!(backend = "native", "Using native driver backend");
                Ok(backend)
            }
            Err(native_err) => {
                warn!(
                    reason = %native_err,
                    "Native driver backend unavailable, falling back to odbc"
                );
                registry.probe(BackendKind::Odbc)
            }
        },
    }
}

/// Preference after applying the environment override
pub fn effective_preference(setting: DriverPreference) -> Result<DriverPreference, ConfigError> {
    let env_value = std::env::var(DRIVER_BACKEND_ENV).ok();
    effective_preference_from(setting, env_value.as_deref())
}

/// Preference after applying an override value; an empty override is ignored
pub fn effective_preference_from(
    setting: DriverPreference,
    override_value: Option<&str>,
) -> Result<DriverPreference, ConfigError> {
    match override_value.map(str::trim) {
        Some(value) if !value.is_empty() => value.parse(),
        _ => Ok(setting),
    }
}

/// Memoized backend resolution shared by all workers
///
/// Resolution happens once per preference; asking for a different
/// preference resolves again and replaces the cached backend.
#[derive(Debug)]
pub struct BackendResolver {
    registry: DriverRegistry,
    cache: Mutex<Option<(DriverPreference, DriverBackend)>>,
}

impl BackendResolver {
    pub fn new(registry: DriverRegistry) -> Self {
        Self {
            registry,
            cache: Mutex::new(None),
        }
    }

    pub fn resolve(&self, preference: DriverPreference) -> Result<DriverBackend, BackendError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        if let Some((cached_pref, backend)) = cache.as_ref() {
            if *cached_pref == preference {
                return Ok(backend.clone());
            }
            debug!(
                from = %cached_pref,
                to = %preference,
                "Driver preference changed, resolving again"
            );
        }

        let backend = resolve_backend(preference, &self.registry)?;
        *cache = Some((preference, backend.clone()));
        Ok(backend)
    }

    /// Resolve using the environment override over `setting`
    pub fn resolve_effective(
        &self,
        setting: DriverPreference,
    ) -> Result<DriverBackend, BackendError> {
        let preference = effective_preference(setting)?;
        self.resolve(preference)
    }

    /// Currently cached preference, if any
    pub fn cached_preference(&self) -> Option<DriverPreference> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.as_ref().map(|(pref, _)| *pref))
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }
}
