//! Plugin-based provider registry
//!
//! Provider crates register a factory under the name used in the
//! `"provider"` field of the settings file, so the daemon builds drivers
//! without an if-else chain over every supported service.
//!
//! ## Registration
//!
//! ```rust,ignore
//! // In the ddns-provider-duckdns crate
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("duckdns", Box::new(DuckDnsFactory));
//! }
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = ProviderRegistry::new();
//! ddns_provider_duckdns::register(&registry);
//!
//! let settings = ddns_core::config::parse_settings(json)?;
//! let providers = registry.create_all(&settings)?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::ProviderSettings;
use crate::error::{Error, Result};
use crate::traits::{Provider, ProviderFactory};

/// Registry of provider factories keyed by provider name
///
/// ## Thread Safety
///
/// Interior mutability with an RwLock: registration takes `&self` and
/// lookups run concurrently.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Box<dyn ProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory, replacing any factory of the same name
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn ProviderFactory>) {
        let name = name.into().to_lowercase();
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        providers.insert(name, factory);
    }

    /// Create the driver for one settings entry
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn Provider>)`: created driver
    /// - `Err(Error)`: unknown provider name or invalid provider fields
    pub fn create_provider(&self, settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        let factory = providers.get(&settings.provider).ok_or_else(|| {
            Error::config(format!("provider {:?} is not supported", settings.provider))
        })?;
        factory.create(settings).map_err(|e| {
            Error::config(format!(
                "{} for {}: {e}",
                settings.provider,
                crate::provider::utils::build_domain_name(&settings.owner, &settings.domain)
            ))
        })
    }

    /// Create drivers for every entry, failing on the first invalid one
    pub fn create_all(&self, settings: &[ProviderSettings]) -> Result<Vec<Arc<dyn Provider>>> {
        settings.iter().map(|s| self.create_provider(s)).collect()
    }

    /// Registered provider names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider name is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        providers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IpVersion;

    struct FailingFactory;

    impl ProviderFactory for FailingFactory {
        fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
            Err(Error::config(format!("{}: token is required", settings.provider)))
        }
    }

    #[test]
    fn registration() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_provider("mock"));

        registry.register_provider("Mock", Box::new(FailingFactory));

        assert!(registry.has_provider("mock"));
        assert_eq!(registry.list_providers(), vec!["mock".to_string()]);
    }

    #[test]
    fn unknown_and_invalid_providers() {
        let registry = ProviderRegistry::new();
        registry.register_provider("mock", Box::new(FailingFactory));

        let unknown = ProviderSettings::new("nope", "example.com", "@", IpVersion::Ipv4);
        let err = registry.create_provider(&unknown).err().unwrap();
        assert!(err.to_string().contains("not supported"));

        let invalid = ProviderSettings::new("mock", "example.com", "www", IpVersion::Ipv4);
        let err = registry.create_provider(&invalid).err().unwrap();
        assert!(err.to_string().contains("www.example.com"));
    }
}
