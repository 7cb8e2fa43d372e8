#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-712 signing and ERC-3009 authorizations for w402 nodes.
//!
//! # Modules
//!
//! - [`key`] - Private key normalization and validation
//! - [`signer`] - [`TypedDataSigner`]: sign, recover and verify EIP-712 data
//! - [`types`] - `TransferWithAuthorization` and its wire form
//! - [`reader`] - Read-only chain access: chain id, token name, balance
//! - [`authorization`] - [`AuthorizationBuilder`] for x402 `exact` payments
//! - [`erc3009`] - Explicit `transferWithAuthorization` sign / verify
//! - [`networks`] - Well-known EVM networks
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod authorization;
mod contract;
pub mod erc3009;
pub mod key;
pub mod networks;
pub mod reader;
pub mod signer;
pub mod types;

pub use authorization::{AuthorizationBuilder, AuthorizationError, ValidityWindow};
pub use reader::{NetworkProvider, RpcNetworkProvider, RpcTokenReader, TokenReader};
pub use signer::{SignerError, TypedDataSigner};
