//! Payment proof and settlement confirmation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::version::X402Version1;

/// The object carried, base64-encoded, in the `X-PAYMENT` header.
///
/// Built fresh for every attempt and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload<TPayload = Value> {
    /// Protocol version, always `1`.
    pub x402_version: X402Version1,
    /// Payment scheme, `"exact"`.
    pub scheme: String,
    /// Network identifier copied from the requirements.
    pub network: String,
    /// Scheme-specific signed data.
    pub payload: TPayload,
}

/// The object carried, base64-encoded, in the `X-PAYMENT-RESPONSE` header.
///
/// Facilitators answer `POST /settle` with the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementConfirmation {
    /// Whether settlement succeeded.
    pub success: bool,
    /// Settlement transaction hash.
    #[serde(default)]
    pub transaction: String,
    /// Network the transaction landed on.
    #[serde(default)]
    pub network: String,
    /// Address that paid.
    #[serde(default)]
    pub payer: String,
    /// Failure reason reported by a facilitator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{Base64Bytes, V1};
    use serde_json::json;

    #[test]
    fn test_payload_roundtrip_through_header() {
        let payload = PaymentPayload {
            x402_version: V1,
            scheme: "exact".to_owned(),
            network: "base-sepolia".to_owned(),
            payload: json!({"signature": "0x01", "authorization": {"value": "1000000"}}),
        };
        let header = Base64Bytes::encode_json(&payload).unwrap().to_string();
        let decoded: PaymentPayload = Base64Bytes::from(header.as_str()).decode_json().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_settlement_requires_success_flag() {
        let ok: SettlementConfirmation =
            serde_json::from_value(json!({"success": true, "transaction": "0xabc", "network": "base"}))
                .unwrap();
        assert_eq!(ok.payer, "");
        assert!(serde_json::from_value::<SettlementConfirmation>(json!({"transaction": "0x"})).is_err());
    }
}
