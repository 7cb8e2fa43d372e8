//! Known EVM networks and their default public RPC endpoints.

use w402::networks::{NetworkInfo, NetworkRegistry};

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: u64 = 1;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: u64 = 137;

/// Base Mainnet chain ID.
pub const BASE_MAINNET: u64 = 8453;

/// Ethereum Sepolia chain ID.
pub const ETHEREUM_SEPOLIA: u64 = 11_155_111;

/// Base Sepolia chain ID.
pub const BASE_SEPOLIA: u64 = 84532;

/// Built-in network table.
pub const KNOWN_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        id: "ethereum",
        chain_id: ETHEREUM_MAINNET,
        rpc_url: "https://eth.llamarpc.com",
    },
    NetworkInfo {
        id: "polygon",
        chain_id: POLYGON_MAINNET,
        rpc_url: "https://polygon.llamarpc.com",
    },
    NetworkInfo {
        id: "base",
        chain_id: BASE_MAINNET,
        rpc_url: "https://mainnet.base.org",
    },
    NetworkInfo {
        id: "sepolia",
        chain_id: ETHEREUM_SEPOLIA,
        rpc_url: "https://0xrpc.io/sep",
    },
    NetworkInfo {
        id: "base-sepolia",
        chain_id: BASE_SEPOLIA,
        rpc_url: "https://sepolia.base.org",
    },
];

/// Alternate names accepted for built-in networks, as `(alias, canonical)`.
pub const NETWORK_ALIASES: &[(&str, &str)] = &[
    ("base-sepolia-testnet", "base-sepolia"),
    ("ethereum-sepolia", "sepolia"),
    ("mainnet", "ethereum"),
];

/// Registry holding [`KNOWN_NETWORKS`] and [`NETWORK_ALIASES`].
#[must_use]
pub fn default_registry() -> NetworkRegistry {
    NETWORK_ALIASES
        .iter()
        .fold(NetworkRegistry::from_networks(KNOWN_NETWORKS), |registry, (alias, canonical)| {
            registry.with_alias(alias, canonical)
        })
}
