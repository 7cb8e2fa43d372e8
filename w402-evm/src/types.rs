//! ERC-3009 authorization types.
//!
//! [`TransferWithAuthorization`] is the EIP-712 struct that gets signed;
//! [`Eip3009Authorization`] is the same data in its JSON wire form, as found
//! under `payload.authorization` in the `X-PAYMENT` header.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{Eip712Domain, eip712_domain, sol};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};
use w402::timestamp::UnixTimestamp;

/// EIP-712 domain version used by ERC-3009 tokens.
pub const TRANSFER_DOMAIN_VERSION: &str = "2";

/// Primary type name of the authorization struct.
pub const TRANSFER_PRIMARY_TYPE: &str = "TransferWithAuthorization";

sol! {
    /// ERC-3009 `TransferWithAuthorization` message.
    #[allow(missing_docs)]
    #[derive(Debug, PartialEq, Eq)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

/// The fixed `types` object for `TransferWithAuthorization`, in the JSON
/// shape wallets and the generic EIP-712 signer expect.
#[must_use]
pub fn transfer_types() -> Value {
    json!({
        "TransferWithAuthorization": [
            { "name": "from", "type": "address" },
            { "name": "to", "type": "address" },
            { "name": "value", "type": "uint256" },
            { "name": "validAfter", "type": "uint256" },
            { "name": "validBefore", "type": "uint256" },
            { "name": "nonce", "type": "bytes32" }
        ]
    })
}

/// Signing domain of an ERC-3009 token.
///
/// `name` must be the token's on-chain `name()`; the version is always
/// [`TRANSFER_DOMAIN_VERSION`].
#[must_use]
pub fn transfer_domain(name: String, chain_id: u64, asset: Address) -> Eip712Domain {
    eip712_domain! {
        name: name,
        version: TRANSFER_DOMAIN_VERSION,
        chain_id: chain_id,
        verifying_contract: asset,
    }
}

/// Token amount in the smallest unit, carried as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(pub U256);

/// A token amount that is not a plain decimal integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("amount must be a non-negative decimal integer, got {0:?}")]
pub struct InvalidAmount(pub String);

impl FromStr for TokenAmount {
    type Err = InvalidAmount;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidAmount(s.to_owned()));
        }
        U256::from_str_radix(trimmed, 10)
            .map(Self)
            .map_err(|_| InvalidAmount(s.to_owned()))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `payload.authorization` of an `exact` EVM payment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip3009Authorization {
    /// Token owner, the signer.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Amount in the token's smallest unit.
    pub value: TokenAmount,
    /// Not valid before this time.
    pub valid_after: UnixTimestamp,
    /// Not valid at or after this time.
    pub valid_before: UnixTimestamp,
    /// Random single-use nonce. Reuse is rejected by the token contract.
    pub nonce: B256,
}

impl Eip3009Authorization {
    /// The EIP-712 struct this authorization signs.
    #[must_use]
    pub fn message(&self) -> TransferWithAuthorization {
        TransferWithAuthorization {
            from: self.from,
            to: self.to,
            value: self.value.0,
            validAfter: U256::from(self.valid_after.as_secs()),
            validBefore: U256::from(self.valid_before.as_secs()),
            nonce: self.nonce,
        }
    }
}

/// `payload` of an `exact` EVM payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    /// 65-byte `r || s || v` signature.
    pub signature: Bytes,
    /// The signed authorization.
    pub authorization: Eip3009Authorization,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_token_amount_is_decimal_only() {
        assert_eq!("1000000".parse::<TokenAmount>().unwrap().0, U256::from(1_000_000u64));
        assert!("0x10".parse::<TokenAmount>().is_err());
        assert!("-1".parse::<TokenAmount>().is_err());
        assert!("".parse::<TokenAmount>().is_err());
        assert!("1.5".parse::<TokenAmount>().is_err());
    }

    #[test]
    fn test_authorization_wire_shape() {
        let auth = Eip3009Authorization {
            from: address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            to: address!("0x209693Bc6afc0C5328bA36FaF03C514EF312287C"),
            value: "1000000".parse().unwrap(),
            valid_after: UnixTimestamp::from_secs(1_700_000_000),
            valid_before: UnixTimestamp::from_secs(1_700_003_600),
            nonce: B256::repeat_byte(0x11),
        };
        let json = serde_json::to_value(auth).unwrap();
        assert_eq!(json["value"], "1000000");
        assert_eq!(json["validAfter"], "1700000000");
        assert_eq!(json["validBefore"], "1700003600");
        assert_eq!(json["nonce"].as_str().unwrap().len(), 66);
        let back: Eip3009Authorization = serde_json::from_value(json).unwrap();
        assert_eq!(back, auth);
        assert_eq!(back.message().validBefore, U256::from(1_700_003_600u64));
    }

    #[test]
    fn test_transfer_domain_fields() {
        let asset = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");
        let domain = transfer_domain("USDC".to_owned(), 84532, asset);
        assert_eq!(domain.name.as_deref(), Some("USDC"));
        assert_eq!(domain.version.as_deref(), Some("2"));
        assert_eq!(domain.chain_id, Some(U256::from(84532u64)));
        assert_eq!(domain.verifying_contract, Some(asset));
    }
}
