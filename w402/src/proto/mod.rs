//! x402 v1 wire format.
//!
//! Challenge, proof, and settlement types, plus the request/response shapes
//! of a remote facilitator's `/verify`, `/settle` and `/supported` endpoints.

mod encoding;
mod payload;
mod requirements;
mod version;

pub use encoding::{Base64Bytes, DecodeError};
pub use payload::{PaymentPayload, SettlementConfirmation};
pub use requirements::{
    EXACT_SCHEME, MISSING_REQUIRED_FIELDS, NO_ACCEPTABLE_SCHEME, PaymentRequired,
    PaymentRequirements, RequirementsError,
};
pub use version::{V1, Version, X402Version1};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{VecSkipError, serde_as};

/// Body of `POST /verify` and `POST /settle`.
///
/// Payload and requirements are forwarded as the operator supplied them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest {
    /// Protocol version, always `1`.
    pub x402_version: X402Version1,
    /// Decoded `X-PAYMENT` payload.
    pub payment_payload: Value,
    /// Requirements the payload is checked against.
    pub payment_requirements: Value,
}

impl FacilitatorRequest {
    /// Pairs a payload with its requirements.
    #[must_use]
    pub const fn new(payment_payload: Value, payment_requirements: Value) -> Self {
        Self {
            x402_version: V1,
            payment_payload,
            payment_requirements,
        }
    }
}

/// Answer of `POST /verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payment would settle.
    pub is_valid: bool,
    /// Reason for rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// Recovered payer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Answer of `POST /settle`.
pub type SettleResponse = SettlementConfirmation;

/// One scheme/network pair a facilitator can settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    /// Protocol version of this kind.
    pub x402_version: u8,
    /// Scheme name.
    pub scheme: String,
    /// Network identifier.
    pub network: String,
    /// Scheme-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Answer of `GET /supported`.
///
/// Entries that fail to parse are dropped instead of failing the whole list.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedResponse {
    /// Supported kinds.
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub kinds: Vec<SupportedPaymentKind>,
}
