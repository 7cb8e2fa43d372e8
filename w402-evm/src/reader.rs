//! Read-only chain access.
//!
//! Signing an ERC-3009 authorization needs three facts from the chain: the
//! chain id, the token's `name()` for the EIP-712 domain, and optionally the
//! payer's balance. [`TokenReader`] abstracts those reads so tests can swap
//! in a fake; [`RpcTokenReader`] is the JSON-RPC implementation.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, RootProvider};
use async_trait::async_trait;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use url::Url;
use w402::networks::NetworkRegistry;

use crate::contract::IEIP3009;

/// Failure of a chain read.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The network id is not registered.
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
    /// JSON-RPC transport failure.
    #[error(transparent)]
    Transport(#[from] alloy_transport::TransportError),
    /// Contract call reverted or returned undecodable data.
    #[error(transparent)]
    Contract(#[from] alloy_contract::Error),
}

/// Read-only queries against one chain.
#[async_trait]
pub trait TokenReader: Send + Sync {
    /// EIP-155 chain id reported by the node.
    async fn chain_id(&self) -> Result<u64, ReadError>;

    /// ERC-20 `name()` of `token`.
    async fn token_name(&self, token: Address) -> Result<String, ReadError>;

    /// ERC-20 `balanceOf(owner)` of `token`.
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ReadError>;
}

/// Hands out a [`TokenReader`] for a network id.
pub trait NetworkProvider: Send + Sync {
    /// Reader for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::UnsupportedNetwork`] if `network` is unknown.
    fn reader(&self, network: &str) -> Result<Arc<dyn TokenReader>, ReadError>;
}

/// [`TokenReader`] over a plain HTTP JSON-RPC provider.
#[derive(Clone)]
pub struct RpcTokenReader {
    provider: RootProvider,
    rpc_url: Url,
}

impl fmt::Debug for RpcTokenReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcTokenReader")
            .field("rpc_url", &self.rpc_url.as_str())
            .finish_non_exhaustive()
    }
}

impl RpcTokenReader {
    /// Connects to `rpc_url`. No request is made until the first read.
    #[must_use]
    pub fn new(rpc_url: Url) -> Self {
        Self {
            provider: RootProvider::new_http(rpc_url.clone()),
            rpc_url,
        }
    }

    /// Endpoint this reader talks to.
    #[must_use]
    pub const fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }
}

#[async_trait]
impl TokenReader for RpcTokenReader {
    #[cfg_attr(feature = "telemetry", instrument(skip(self), err, fields(rpc = %self.rpc_url)))]
    async fn chain_id(&self) -> Result<u64, ReadError> {
        Ok(self.provider.get_chain_id().await?)
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self), err, fields(rpc = %self.rpc_url)))]
    async fn token_name(&self, token: Address) -> Result<String, ReadError> {
        let contract = IEIP3009::new(token, self.provider.clone());
        Ok(contract.name().call().await?)
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self), err, fields(rpc = %self.rpc_url)))]
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ReadError> {
        let contract = IEIP3009::new(token, self.provider.clone());
        Ok(contract.balanceOf(owner).call().await?)
    }
}

/// [`NetworkProvider`] backed by a [`NetworkRegistry`].
///
/// A custom RPC URL, when set, replaces the registry endpoint for every
/// network and also serves networks the registry does not know.
#[derive(Debug, Clone)]
pub struct RpcNetworkProvider {
    registry: Arc<NetworkRegistry>,
    custom_rpc: Option<Url>,
}

impl RpcNetworkProvider {
    /// Provider using each network's registered endpoint.
    #[must_use]
    pub const fn new(registry: Arc<NetworkRegistry>) -> Self {
        Self {
            registry,
            custom_rpc: None,
        }
    }

    /// Overrides the endpoint for all networks.
    #[must_use]
    pub fn with_custom_rpc(mut self, url: Option<Url>) -> Self {
        self.custom_rpc = url;
        self
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }
}

impl NetworkProvider for RpcNetworkProvider {
    fn reader(&self, network: &str) -> Result<Arc<dyn TokenReader>, ReadError> {
        let url = match &self.custom_rpc {
            Some(url) => url.clone(),
            None => self
                .registry
                .resolve(network)
                .map(|entry| entry.rpc_url.clone())
                .ok_or_else(|| ReadError::UnsupportedNetwork(network.to_owned()))?,
        };
        Ok(Arc::new(RpcTokenReader::new(url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use w402::networks::NetworkInfo;

    fn provider() -> RpcNetworkProvider {
        let registry = NetworkRegistry::from_networks(&[NetworkInfo {
            id: "base-sepolia",
            chain_id: 84532,
            rpc_url: "https://sepolia.base.org",
        }])
        .with_alias("base-sepolia-testnet", "base-sepolia");
        RpcNetworkProvider::new(Arc::new(registry))
    }

    #[test]
    fn test_unknown_network_is_rejected() {
        let err = provider().reader("solana").err().unwrap();
        assert!(matches!(err, ReadError::UnsupportedNetwork(ref n) if n == "solana"));
        assert_eq!(err.to_string(), "Unsupported network: solana");
    }

    #[test]
    fn test_alias_and_custom_rpc_resolve() {
        assert!(provider().reader("base-sepolia-testnet").is_ok());
        let custom = Url::parse("http://127.0.0.1:8545").unwrap();
        let provider = provider().with_custom_rpc(Some(custom));
        assert!(provider.reader("base-sepolia").is_ok());
    }

    #[test]
    fn test_custom_rpc_serves_unregistered_network() {
        assert!(provider().reader("my-devnet").is_err());
        let custom = Url::parse("http://127.0.0.1:8545").unwrap();
        let provider = provider().with_custom_rpc(Some(custom));
        assert!(provider.reader("my-devnet").is_ok());
        assert!(provider.reader("polygon").is_ok());
    }
}
