//! Error taxonomy shared by every node.
//!
//! Library crates keep their own `thiserror` enums and classify each variant
//! into an [`ErrorKind`]. At the node boundary every failure collapses into a
//! [`NodeError`], the structured per-item failure handed to the host.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Malformed address, key, nonce, amount, or request parameter.
    /// Raised before any network call is made.
    Validation,
    /// RPC or HTTP endpoint unreachable, timed out, or answered unexpectedly.
    Network,
    /// The counterparty broke the x402 exchange (402 twice, 200 without settlement).
    ProtocolViolation,
    /// An operator-supplied static template could not be parsed.
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation error",
            Self::Network => "network error",
            Self::ProtocolViolation => "protocol violation",
            Self::Configuration => "configuration error",
        };
        f.write_str(s)
    }
}

/// A structured failure for one work item.
///
/// Whether the failure aborts the batch or becomes an `{"error": ...}` item
/// is decided by the host's continue-on-fail policy, see
/// [`run_items`](crate::node::run_items).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct NodeError {
    /// Failure class.
    pub kind: ErrorKind,
    /// Human-readable message, surfaced to the operator verbatim.
    pub message: String,
    /// Optional hint on how to fix the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Index of the item that failed, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<usize>,
}

impl NodeError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            description: None,
            item: None,
        }
    }

    /// Shorthand for [`ErrorKind::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Shorthand for [`ErrorKind::Network`].
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Shorthand for [`ErrorKind::ProtocolViolation`].
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolViolation, message)
    }

    /// Shorthand for [`ErrorKind::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Attaches a remediation hint.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Records the failing item index, keeping an index set earlier.
    #[must_use]
    pub fn at_item(mut self, item: usize) -> Self {
        if self.item.is_none() {
            self.item = Some(item);
        }
        self
    }

    /// The JSON item emitted in place of a result under continue-on-fail.
    #[must_use]
    pub fn to_item(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_item_keeps_first_index() {
        let err = NodeError::validation("bad").at_item(2).at_item(5);
        assert_eq!(err.item, Some(2));
    }

    #[test]
    fn test_serializes_kind_camel_case() {
        let err = NodeError::protocol("402 twice");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "protocolViolation");
        assert_eq!(json["message"], "402 twice");
        assert!(json.get("item").is_none());
    }

    #[test]
    fn test_error_item_shape() {
        let err = NodeError::network("connection refused");
        assert_eq!(err.to_item(), serde_json::json!({"error": "connection refused"}));
        assert_eq!(err.to_string(), "connection refused");
    }
}
