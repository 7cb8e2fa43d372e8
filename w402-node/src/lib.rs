#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! x402 payment nodes for workflow automation.
//!
//! Each node reads its parameters from a [`NodeContext`](w402::node::NodeContext),
//! runs one library operation per input item and returns JSON items. The
//! crate also ships a standalone payment gate that hosts the endpoint and
//! response nodes over HTTP.
//!
//! # Modules
//!
//! - [`nodes`] - The workflow nodes
//! - [`params`] - Shared parameter shapes
//! - [`payment`] - EVM signing hook for the HTTP client
//! - [`config`] - Gate server configuration with environment variable expansion
//! - [`server`] - Axum router for payment-gated routes
//! - [`util`] - Shutdown signal handling

pub mod config;
pub mod nodes;
pub mod params;
pub mod payment;
pub mod server;
pub mod util;
