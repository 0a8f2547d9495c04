//! Config storage abstraction.
//!
//! The storage format is owned by the host; the core only loads and stores
//! flat string maps per scope.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Namespace a set of config entries belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigScope {
    /// Settings of the core itself.
    General,
    /// Settings owned by one plugin, keyed by plugin id.
    Plugin(String),
    /// Credentials. Values must never be logged.
    Secrets,
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigScope::General => f.write_str("general"),
            ConfigScope::Plugin(id) => write!(f, "plugin:{id}"),
            ConfigScope::Secrets => f.write_str("secrets"),
        }
    }
}

#[async_trait]
pub trait ConfigStorageAdapter: Send + Sync {
    /// Load every entry of `scope`. An unknown scope yields an empty map.
    async fn load(&self, scope: &ConfigScope) -> Result<HashMap<String, String>>;

    /// Replace the stored entries of `scope`.
    async fn store(&self, scope: &ConfigScope, config: &HashMap<String, String>) -> Result<()>;
}

/// Keeps config in memory. Useful for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryConfigStorage {
    scopes: Mutex<HashMap<ConfigScope, HashMap<String, String>>>,
}

impl MemoryConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStorageAdapter for MemoryConfigStorage {
    async fn load(&self, scope: &ConfigScope) -> Result<HashMap<String, String>> {
        Ok(self.scopes.lock().get(scope).cloned().unwrap_or_default())
    }

    async fn store(&self, scope: &ConfigScope, config: &HashMap<String, String>) -> Result<()> {
        self.scopes.lock().insert(scope.clone(), config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_round_trip_per_scope() {
        let storage = MemoryConfigStorage::new();
        let mut general = HashMap::new();
        general.insert("cache.max_entries".to_string(), "8".to_string());

        storage.store(&ConfigScope::General, &general).await.unwrap();

        assert_eq!(storage.load(&ConfigScope::General).await.unwrap(), general);
        assert!(storage
            .load(&ConfigScope::Plugin("local".into()))
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(ConfigScope::Plugin("yt".into()).to_string(), "plugin:yt");
        assert_eq!(ConfigScope::Secrets.to_string(), "secrets");
    }
}
