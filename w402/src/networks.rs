//! Network lookup service.
//!
//! Maps a network identifier such as `"base-sepolia"` to its numeric chain
//! id and a JSON-RPC endpoint. The registry is built once at startup and
//! shared read-only; tests build their own with fake endpoints.
//!
//! Concrete EVM network data lives in `w402-evm`.
//!
//! # Example
//!
//! ```
//! use w402::networks::{NetworkInfo, NetworkRegistry};
//!
//! let registry = NetworkRegistry::from_networks(&[NetworkInfo {
//!     id: "base-sepolia",
//!     chain_id: 84532,
//!     rpc_url: "https://sepolia.base.org",
//! }])
//! .with_alias("base-sepolia-testnet", "base-sepolia");
//!
//! assert_eq!(registry.canonical("base-sepolia-testnet"), "base-sepolia");
//! assert_eq!(registry.resolve("base-sepolia-testnet").unwrap().chain_id, 84532);
//! ```

use std::collections::HashMap;

use url::Url;

/// A static network definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Canonical identifier, e.g. `"base-sepolia"`.
    pub id: &'static str,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Default public JSON-RPC endpoint.
    pub rpc_url: &'static str,
}

/// A resolved registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEntry {
    /// Canonical identifier.
    pub id: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
}

/// Failure to register a network.
#[derive(Debug, thiserror::Error)]
#[error("invalid RPC URL for network {network}: {source}")]
pub struct RegistryError {
    /// Offending network id.
    pub network: String,
    /// Parse failure.
    #[source]
    pub source: url::ParseError,
}

/// Immutable `network id -> {chainId, rpcUrl}` lookup with aliases.
///
/// Identifiers compare case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: HashMap<String, NetworkEntry>,
    aliases: HashMap<String, String>,
}

impl NetworkRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated from static definitions.
    ///
    /// Definitions whose URL does not parse are skipped.
    #[must_use]
    pub fn from_networks(networks: &[NetworkInfo]) -> Self {
        let mut registry = Self::new();
        for info in networks {
            if let Err(_err) = registry.register(info.id, info.chain_id, info.rpc_url) {
                #[cfg(feature = "telemetry")]
                tracing::warn!(network = info.id, error = %_err, "skipping network");
            }
        }
        registry
    }

    /// Adds or replaces a network.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if `rpc_url` is not a valid URL.
    pub fn register(&mut self, id: &str, chain_id: u64, rpc_url: &str) -> Result<(), RegistryError> {
        let rpc_url = Url::parse(rpc_url).map_err(|source| RegistryError {
            network: id.to_owned(),
            source,
        })?;
        let key = id.to_ascii_lowercase();
        self.networks.insert(
            key.clone(),
            NetworkEntry {
                id: key,
                chain_id,
                rpc_url,
            },
        );
        Ok(())
    }

    /// Builder-style [`Self::register`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if `rpc_url` is not a valid URL.
    pub fn with_network(mut self, id: &str, chain_id: u64, rpc_url: &str) -> Result<Self, RegistryError> {
        self.register(id, chain_id, rpc_url)?;
        Ok(self)
    }

    /// Declares `alias` as another name for `canonical`.
    #[must_use]
    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        self.aliases
            .insert(alias.to_ascii_lowercase(), canonical.to_ascii_lowercase());
        self
    }

    /// Canonical id for `id`: the alias target if one exists, otherwise `id`
    /// trimmed and lower-cased.
    #[must_use]
    pub fn canonical(&self, id: &str) -> String {
        let key = id.trim().to_ascii_lowercase();
        self.aliases.get(&key).cloned().unwrap_or(key)
    }

    /// Looks up a network by id or alias.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<&NetworkEntry> {
        self.networks.get(&self.canonical(id))
    }

    /// Looks up a network by chain id.
    #[must_use]
    pub fn by_chain_id(&self, chain_id: u64) -> Option<&NetworkEntry> {
        self.networks.values().find(|entry| entry.chain_id == chain_id)
    }

    /// Registered canonical ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.networks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NetworkRegistry {
        NetworkRegistry::from_networks(&[
            NetworkInfo {
                id: "base-sepolia",
                chain_id: 84532,
                rpc_url: "https://sepolia.base.org",
            },
            NetworkInfo {
                id: "broken",
                chain_id: 1,
                rpc_url: "not a url",
            },
        ])
        .with_alias("base-sepolia-testnet", "base-sepolia")
    }

    #[test]
    fn test_alias_resolves_to_canonical() {
        let registry = registry();
        assert_eq!(registry.canonical("Base-Sepolia-Testnet"), "base-sepolia");
        assert_eq!(registry.canonical("unknown-net"), "unknown-net");
        let entry = registry.resolve("base-sepolia-testnet").unwrap();
        assert_eq!(entry.chain_id, 84532);
        assert_eq!(entry.rpc_url.as_str(), "https://sepolia.base.org/");
    }

    #[test]
    fn test_invalid_url_is_skipped() {
        let registry = registry();
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("broken").is_none());
        assert!(NetworkRegistry::new().with_network("x", 1, "::").is_err());
    }

    #[test]
    fn test_lookup_by_chain_id() {
        let registry = registry();
        assert_eq!(registry.by_chain_id(84532).unwrap().id, "base-sepolia");
        assert!(registry.by_chain_id(1).is_none());
        assert_eq!(registry.ids(), vec!["base-sepolia"]);
    }
}
