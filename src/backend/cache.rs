//! Per-run backend instance cache

use super::{LocalBackend, RemoteBackend, SharedBackend};
use crate::config::RemoteSettings;
use crate::location::{BackendKey, Location, Scheme};
use crate::types::SyncError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Backend instances keyed by (scheme, authority).
///
/// Two locations with the same key resolve to the same instance, which is
/// what lets the decision engine pick a native copy. A cache lives for one
/// sync run and is dropped with it.
pub struct BackendCache {
    settings: RemoteSettings,
    backends: HashMap<BackendKey, SharedBackend>,
}

impl BackendCache {
    pub fn new(settings: RemoteSettings) -> Self {
        Self {
            settings,
            backends: HashMap::new(),
        }
    }

    /// Use `backend` for every location with this key.
    pub fn register(&mut self, key: BackendKey, backend: SharedBackend) {
        self.backends.insert(key, backend);
    }

    /// Return the cached instance for `location`, constructing it on first use.
    pub fn resolve(&mut self, location: &Location) -> Result<SharedBackend, SyncError> {
        let key = location.key();
        if let Some(backend) = self.backends.get(&key) {
            return Ok(Arc::clone(backend));
        }

        let config = self.settings.for_authority(&key.authority);
        let backend: SharedBackend = match &key.scheme {
            Scheme::Local => Arc::new(LocalBackend::new()),
            Scheme::Memory => Arc::new(RemoteBackend::memory(&key.authority)?),
            Scheme::WebDav | Scheme::WebDavs => Arc::new(RemoteBackend::webdav(&key, &config)?),
            Scheme::S3 => Arc::new(RemoteBackend::s3(&key.authority, &config)?),
            Scheme::Other(name) => {
                return Err(SyncError::InvalidLocator(format!(
                    "unsupported scheme '{}' in {}",
                    name, location
                )))
            }
        };

        info!("Initialized backend {}", backend.name());
        self.backends.insert(key, Arc::clone(&backend));
        Ok(backend)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl Default for BackendCache {
    fn default() -> Self {
        Self::new(RemoteSettings::default())
    }
}

/// Identity check: do both handles point at the same backend instance?
pub fn same_backend(a: &SharedBackend, b: &SharedBackend) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    fn parse(locator: &str) -> Location {
        Location::parse(locator, Utf8Path::new("/work")).expect("parse locator")
    }

    #[test]
    fn test_same_configuration_shares_instance() {
        let mut cache = BackendCache::default();
        let a = cache.resolve(&parse("memory://shared/src")).expect("resolve a");
        let b = cache.resolve(&parse("memory://shared/dst")).expect("resolve b");

        assert!(same_backend(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_configuration_distinct_instances() {
        let mut cache = BackendCache::default();
        let a = cache.resolve(&parse("memory://one/x")).expect("resolve a");
        let b = cache.resolve(&parse("memory://two/x")).expect("resolve b");
        let local = cache.resolve(&parse("relative/dir")).expect("resolve local");
        let local_again = cache.resolve(&parse("/abs/dir")).expect("resolve local again");

        assert!(!same_backend(&a, &b));
        assert!(same_backend(&local, &local_again));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let mut cache = BackendCache::default();
        let result = cache.resolve(&parse("irods://data.example.org/zone"));
        assert!(matches!(result, Err(SyncError::InvalidLocator(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_registered_backend_wins() {
        let mut cache = BackendCache::default();
        let location = parse("custom://fixture/tree");
        let backend: SharedBackend = Arc::new(LocalBackend::new());
        cache.register(location.key(), Arc::clone(&backend));

        let resolved = cache.resolve(&location).expect("resolve registered");
        assert!(same_backend(&resolved, &backend));
    }
}
