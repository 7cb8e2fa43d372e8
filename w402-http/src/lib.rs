#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for the w402 payment nodes.
//!
//! # Modules
//!
//! - [`constants`] - Header names, status codes, defaults
//! - [`headers`] - `X-PAYMENT` / `X-PAYMENT-RESPONSE` codecs
//! - [`error`] - Header codec errors
//! - [`client`] - Payment-challenge HTTP client (feature: `client`)
//! - [`facilitator`] - Facilitator HTTP client (feature: `client`)
//! - [`server`] - Payment gate classifier and response emitter (feature: `server`)
//!
//! # Feature Flags
//!
//! - `client` - reqwest-based clients
//! - `server` - axum response conversion for the payment gate
//! - `telemetry` - Enables tracing instrumentation

pub mod constants;
pub mod error;
pub mod headers;
pub mod server;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod facilitator;
