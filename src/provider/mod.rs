pub mod ansi;
pub mod postgres;
pub mod services;

use std::collections::HashMap;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::storage::Connector;
use crate::types::TypeMapper;

pub use services::{ProviderServices, ProviderServicesBuilder};

/// A provider supplies the database-specific pieces of the core: its SQL
/// dialect, its type mappings and a way to open sessions.
pub trait Provider: Send + Sync {
    /// Returns the name of this provider (e.g., "postgres", "ansi")
    fn name(&self) -> &str;

    fn dialect(&self) -> Dialect;

    /// Register every type mapping this provider supports.
    fn register_type_mappings(&self, mapper: &mut TypeMapper) -> Result<()>;

    /// Connector opening sessions for `dsn`. Providers without a driver
    /// return a `Config` error.
    fn connector(&self, _dsn: &str) -> Result<Box<dyn Connector>> {
        Err(Error::Config(format!(
            "provider '{}' has no database driver",
            self.name()
        )))
    }
}

/// Registry for managing database providers.
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn Provider>>,
    aliases: HashMap<String, String>,
}

impl ProviderRegistry {
    /// Create a new empty provider registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Register a provider with the registry.
    pub fn register(&mut self, provider: Box<dyn Provider>) {
        let name = provider.name().to_string();
        self.providers.insert(name, provider);
    }

    /// Make `alias` resolve to the provider registered as `name`.
    pub fn register_alias(&mut self, alias: &str, name: &str) {
        self.aliases.insert(alias.to_string(), name.to_string());
    }

    /// Get a provider by name or alias.
    pub fn get(&self, name: &str) -> Option<&dyn Provider> {
        let name = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.providers.get(name).map(|p| &**p)
    }

    /// List all registered provider names, sorted.
    pub fn list_providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a provider registry with all built-in providers registered.
pub fn get_default_provider_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(postgres::PostgresProvider::new()));
    registry.register_alias("pg", "postgres");
    registry.register_alias("postgresql", "postgres");
    registry.register(Box::new(ansi::AnsiProvider::new()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_resolves_aliases() {
        let registry = get_default_provider_registry();
        assert_eq!(registry.list_providers(), vec!["ansi", "postgres"]);
        assert_eq!(registry.get("pg").map(|p| p.name()), Some("postgres"));
        assert_eq!(registry.get("postgresql").map(|p| p.name()), Some("postgres"));
        assert!(registry.get("mysql").is_none());
    }

    #[test]
    fn ansi_has_no_driver() {
        let registry = get_default_provider_registry();
        let ansi = registry.get("ansi").unwrap();
        let err = ansi.connector("postgres://localhost/db").err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
