//! Gate server configuration.
//!
//! Loaded from a JSON file. Every string value may reference environment
//! variables as `$VAR` or `${VAR}`; unresolved references are kept verbatim.
//!
//! ```json
//! {
//!   "port": 4021,
//!   "publicUrl": "https://api.example.com",
//!   "facilitatorUrl": "https://x402.org/facilitator",
//!   "facilitatorApiKey": "$FACILITATOR_API_KEY",
//!   "networks": [
//!     { "id": "base-sepolia", "chainId": 84532, "rpcUrl": "${BASE_SEPOLIA_RPC}" }
//!   ],
//!   "gates": [
//!     {
//!       "path": "/weather",
//!       "network": "base-sepolia",
//!       "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
//!       "payTo": "$PAY_TO",
//!       "amountRequired": "10000",
//!       "description": "Current weather",
//!       "response": { "forecast": "sunny" }
//!     }
//!   ]
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to the configuration file (default: `w402.json`)
//! - `HOST` - Override bind address
//! - `PORT` - Override port

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::Deserialize;
use serde_json::{Value, json};
use w402::networks::{NetworkRegistry, RegistryError};
use w402_http::constants::{DEFAULT_MAX_TIMEOUT_SECONDS, DEFAULT_MIME_TYPE};

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "w402.json";

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but cannot be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The content is not valid configuration JSON.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// A configured network has a malformed RPC URL.
    #[error(transparent)]
    Network(#[from] RegistryError),
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port (default: `4021`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// External base URL used for the challenge `resource`. Without one the
    /// request's `Host` header is used.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Facilitator used to verify and settle payments. Without one, any
    /// well-formed payment is accepted unverified.
    #[serde(default)]
    pub facilitator_url: Option<String>,

    /// Bearer key for the facilitator.
    #[serde(default)]
    pub facilitator_api_key: Option<String>,

    /// Networks added to, or replacing, the built-in table.
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,

    /// Payment-gated routes.
    #[serde(default)]
    pub gates: Vec<GateConfig>,
}

/// One extra network.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Network id.
    pub id: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: String,
}

/// One payment-gated route.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateConfig {
    /// Route path, e.g. `/weather`.
    pub path: String,
    /// Accepted method; any method when absent.
    #[serde(default)]
    pub method: Option<String>,
    /// Payment network.
    pub network: String,
    /// Token contract.
    pub asset: String,
    /// Recipient.
    pub pay_to: String,
    /// Amount in the token's smallest unit.
    pub amount_required: String,
    /// Resource description.
    #[serde(default)]
    pub description: Option<String>,
    /// Resource MIME type.
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Signature validity the server allows.
    #[serde(default = "default_max_timeout")]
    pub max_timeout_seconds: u64,
    /// JSON body served once paid.
    #[serde(default = "default_response")]
    pub response: Value,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    4021
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_owned()
}

const fn default_max_timeout() -> u64 {
    DEFAULT_MAX_TIMEOUT_SECONDS
}

fn default_response() -> Value {
    json!({"status": "success"})
}

impl NodeConfig {
    /// Loads the file named by `CONFIG`, or [`DEFAULT_CONFIG_PATH`], then
    /// applies `HOST` / `PORT` overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
        Self::load_from(&path)
    }

    /// Loads a specific file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            tracing::warn!(path, "configuration file not found, using defaults");
            "{}".to_owned()
        };
        let mut config = Self::from_json(&content, |name| std::env::var(name).ok())?;
        if let Some(host) = std::env::var("HOST").ok().and_then(|h| h.parse().ok()) {
            config.host = host;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        Ok(config)
    }

    /// Parses configuration text, resolving variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON or a missing field.
    pub fn from_json(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut raw: Value = serde_json::from_str(content)?;
        expand_strings(&mut raw, &lookup);
        Ok(serde_json::from_value(raw)?)
    }

    /// The built-in network table extended with [`Self::networks`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Network`] if a configured RPC URL is invalid.
    pub fn registry(&self) -> Result<NetworkRegistry, ConfigError> {
        let mut registry = w402_evm::networks::default_registry();
        for network in &self.networks {
            registry.register(&network.id, network.chain_id, &network.rpc_url)?;
        }
        Ok(registry)
    }
}

fn expand_strings(value: &mut Value, lookup: &impl Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) if s.contains('$') => *s = expand_env_vars(s, lookup),
        Value::Array(values) => values.iter_mut().for_each(|v| expand_strings(v, lookup)),
        Value::Object(map) => map.values_mut().for_each(|v| expand_strings(v, lookup)),
        _ => {}
    }
}

/// Expands `$VAR` and `${VAR}`, leaving unknown variables as written.
fn expand_env_vars(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match lookup(&name).filter(|_| !name.is_empty()) {
            Some(value) => result.push_str(&value),
            None => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}
