#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for x402 payment-challenge workflow nodes.
//!
//! This crate holds everything the EVM, HTTP, and node crates share: the
//! x402 v1 wire types, base64 header encoding, authorization timestamps, the
//! injected network registry, the per-item error taxonomy, and the host
//! abstraction that nodes execute against.
//!
//! # Overview
//!
//! A resource server answers an unpaid request with HTTP 402 and a list of
//! [`PaymentRequirements`](proto::PaymentRequirements). The client signs an
//! ERC-3009 authorization satisfying the first entry, retries once with an
//! `X-PAYMENT` header, and reads a
//! [`SettlementConfirmation`](proto::SettlementConfirmation) back from the
//! `X-PAYMENT-RESPONSE` header.
//!
//! # Modules
//!
//! - [`error`] - Error kinds and the structured per-item [`NodeError`]
//! - [`networks`] - Immutable `network id -> {chainId, rpcUrl}` lookup
//! - [`node`] - Host capability trait, node trait, and the item runner
//! - [`proto`] - Wire format types and base64 encoding
//! - [`timestamp`] - Unix timestamps for authorization windows
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod error;
pub mod networks;
pub mod node;
pub mod proto;
pub mod timestamp;

pub use error::{ErrorKind, NodeError};
