//! Base64 JSON codecs for the `X-PAYMENT` and `X-PAYMENT-RESPONSE` headers.

use serde::Serialize;
use serde_json::Value;
use w402::proto::{Base64Bytes, PaymentPayload, SettlementConfirmation};

use crate::constants::{X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER};
use crate::error::HeaderError;

/// Encodes a payment payload for the `X-PAYMENT` header.
///
/// # Errors
///
/// Returns [`HeaderError::Serialize`] if JSON serialization fails.
pub fn encode_x_payment<T: Serialize>(payload: &PaymentPayload<T>) -> Result<String, HeaderError> {
    Ok(Base64Bytes::encode_json(payload)?.to_string())
}

/// Decodes an `X-PAYMENT` header value into untyped JSON.
///
/// Field presence is not checked; see [`crate::server::classify`].
///
/// # Errors
///
/// Returns [`HeaderError::Decode`] on a base64 or JSON failure.
pub fn decode_x_payment(value: &str) -> Result<Value, HeaderError> {
    Base64Bytes::from(value)
        .decode_json()
        .map_err(|source| HeaderError::Decode {
            header: X_PAYMENT_HEADER,
            source,
        })
}

/// Encodes a settlement confirmation for the `X-PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// Returns [`HeaderError::Serialize`] if JSON serialization fails.
pub fn encode_payment_response(response: &SettlementConfirmation) -> Result<String, HeaderError> {
    Ok(Base64Bytes::encode_json(response)?.to_string())
}

/// Decodes an `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns [`HeaderError::Decode`] on a base64 or JSON failure, including a
/// missing `success` field.
pub fn decode_payment_response(value: &str) -> Result<SettlementConfirmation, HeaderError> {
    Base64Bytes::from(value)
        .decode_json()
        .map_err(|source| HeaderError::Decode {
            header: X_PAYMENT_RESPONSE_HEADER,
            source,
        })
}

/// Reads `name` from `headers` as a string. Lookup is case-insensitive.
///
/// # Errors
///
/// Returns [`HeaderError::NotAscii`] if the value is not visible ASCII.
pub fn header_str<'a>(
    headers: &'a http::HeaderMap,
    name: &'static str,
) -> Result<Option<&'a str>, HeaderError> {
    headers
        .get(name)
        .map(|v| v.to_str().map_err(|_| HeaderError::NotAscii(name)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use w402::proto::V1;

    #[test]
    fn test_x_payment_roundtrip() {
        let payload = PaymentPayload {
            x402_version: V1,
            scheme: "exact".to_owned(),
            network: "base-sepolia".to_owned(),
            payload: json!({"signature": "0xabc"}),
        };
        let header = encode_x_payment(&payload).unwrap();
        let decoded = decode_x_payment(&header).unwrap();
        assert_eq!(decoded["x402Version"], 1);
        assert_eq!(decoded["payload"]["signature"], "0xabc");
    }

    #[test]
    fn test_payment_response_requires_success() {
        let header = Base64Bytes::encode_json(&json!({"transaction": "0x1"}))
            .unwrap()
            .to_string();
        let err = decode_payment_response(&header).unwrap_err();
        assert!(err.to_string().starts_with("Failed to decode X-PAYMENT-RESPONSE header"));
        assert!(decode_payment_response("%%%").is_err());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = http::HeaderMap::new();
        headers.insert("x-payment", http::HeaderValue::from_static("abc"));
        assert_eq!(header_str(&headers, X_PAYMENT_HEADER).unwrap(), Some("abc"));
        assert_eq!(header_str(&headers, X_PAYMENT_RESPONSE_HEADER).unwrap(), None);
    }
}
