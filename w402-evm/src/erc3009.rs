//! Explicit `transferWithAuthorization` signing and verification.
//!
//! Unlike [`crate::authorization`], every message field is supplied by the
//! caller. Only the token name (and, for custom endpoints, the chain id) is
//! read from the chain.

use alloy_primitives::{Address, B256};
use alloy_sol_types::Eip712Domain;
use serde_json::{Value, json};
#[cfg(feature = "telemetry")]
use tracing::instrument;
use w402::timestamp::UnixTimestamp;

use crate::authorization::{AuthorizationError, parse_address, parse_amount, parse_nonce};
use crate::reader::TokenReader;
use crate::signer::{self, TypedDataSigner, TypedStruct, parse_signature, signature_hex};
use crate::types::{
    Eip3009Authorization, TRANSFER_DOMAIN_VERSION, TransferWithAuthorization, transfer_domain,
    transfer_types,
};

/// A fully specified transfer authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    /// Token contract, the EIP-712 verifying contract.
    pub token: Address,
    /// The authorization itself.
    pub authorization: Eip3009Authorization,
}

impl TransferRequest {
    /// Validates raw field values.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError`] naming the first malformed field.
    pub fn parse(
        token: &str,
        from: &str,
        to: &str,
        value: &str,
        valid_after: u64,
        valid_before: u64,
        nonce: &str,
    ) -> Result<Self, AuthorizationError> {
        Ok(Self {
            token: parse_address("token contract", token)?,
            authorization: Eip3009Authorization {
                from: parse_address("from", from)?,
                to: parse_address("to", to)?,
                value: parse_amount(value)?,
                valid_after: UnixTimestamp::from_secs(valid_after),
                valid_before: UnixTimestamp::from_secs(valid_before),
                nonce: parse_nonce(nonce)?,
            },
        })
    }
}

/// Chain id and token name, as read for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDomain {
    /// Token `name()`.
    pub name: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Token contract.
    pub token: Address,
}

impl TokenDomain {
    /// Reads the token name, and the chain id when `chain_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError::ChainIdUnavailable`] or
    /// [`AuthorizationError::TokenMetadataUnavailable`].
    #[cfg_attr(feature = "telemetry", instrument(skip(reader), err))]
    pub async fn fetch(
        reader: &dyn TokenReader,
        token: Address,
        chain_id: Option<u64>,
    ) -> Result<Self, AuthorizationError> {
        let chain_id = match chain_id {
            Some(id) => id,
            None => reader
                .chain_id()
                .await
                .map_err(AuthorizationError::ChainIdUnavailable)?,
        };
        let name = reader
            .token_name(token)
            .await
            .map_err(AuthorizationError::TokenMetadataUnavailable)?;
        Ok(Self {
            name,
            chain_id,
            token,
        })
    }

    /// The domain as JSON, `{name, version, chainId, verifyingContract}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "version": TRANSFER_DOMAIN_VERSION,
            "chainId": self.chain_id,
            "verifyingContract": self.token.to_string(),
        })
    }
}

/// Output of [`sign_transfer`].
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    /// `0x`-prefixed 65-byte signature.
    pub signature: String,
    /// Address of the signing key.
    pub signer: Address,
    /// Domain that was signed over.
    pub domain: TokenDomain,
    /// Message that was signed.
    pub authorization: Eip3009Authorization,
}

impl SignedTransfer {
    /// Output item: signature, signer address, domain, types and message.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "signature": self.signature,
            "signerAddress": self.signer.to_string(),
            "domain": self.domain.to_json(),
            "types": transfer_types(),
            "message": message_json(&self.authorization),
            "operation": "transferWithAuthorization",
            "tokenContract": self.domain.token.to_string(),
        })
    }
}

/// Output of [`verify_transfer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferVerification {
    /// Recovered address equals the expected one.
    pub is_valid: bool,
    /// Address recovered from the signature.
    pub recovered: Address,
    /// Recovery id, 27 or 28.
    pub v: u8,
    /// Signature `r`.
    pub r: B256,
    /// Signature `s`.
    pub s: B256,
}

impl TransferVerification {
    /// Output item fields.
    #[must_use]
    pub fn to_json(
        &self,
        expected: &str,
        signature: &str,
        domain: &TokenDomain,
        auth: &Eip3009Authorization,
    ) -> Value {
        json!({
            "isValid": self.is_valid,
            "recoveredAddress": self.recovered.to_string(),
            "expectedSignerAddress": expected,
            "signature": signature,
            "v": self.v,
            "r": self.r.to_string(),
            "s": self.s.to_string(),
            "domain": domain.to_json(),
            "types": transfer_types(),
            "message": message_json(auth),
            "operation": "transferWithAuthorization",
            "tokenContract": domain.token.to_string(),
        })
    }
}

fn message_json(auth: &Eip3009Authorization) -> Value {
    json!({
        "from": auth.from.to_string(),
        "to": auth.to.to_string(),
        "value": auth.value.to_string(),
        "validAfter": auth.valid_after.as_secs(),
        "validBefore": auth.valid_before.as_secs(),
        "nonce": auth.nonce.to_string(),
    })
}

fn typed(
    domain: &TokenDomain,
    auth: &Eip3009Authorization,
) -> (Eip712Domain, TransferWithAuthorization) {
    (
        transfer_domain(domain.name.clone(), domain.chain_id, domain.token),
        auth.message(),
    )
}

/// Signs `request` over `domain`.
///
/// # Errors
///
/// Returns [`AuthorizationError::Signer`] if signing fails.
pub fn sign_transfer(
    signer: &TypedDataSigner,
    domain: TokenDomain,
    request: &TransferRequest,
) -> Result<SignedTransfer, AuthorizationError> {
    let (eip712, message) = typed(&domain, &request.authorization);
    let signature = signer.sign(&TypedStruct {
        domain: &eip712,
        message: &message,
    })?;
    Ok(SignedTransfer {
        signature: signature_hex(&signature),
        signer: signer.address(),
        domain,
        authorization: request.authorization,
    })
}

/// Recovers the signer of `signature` over `request` and compares it to
/// `expected`, case-insensitively.
///
/// # Errors
///
/// Returns [`AuthorizationError::Signer`] if the signature is malformed.
pub fn verify_transfer(
    domain: &TokenDomain,
    request: &TransferRequest,
    signature: &str,
    expected: &str,
) -> Result<TransferVerification, AuthorizationError> {
    let (eip712, message) = typed(domain, &request.authorization);
    let data = TypedStruct {
        domain: &eip712,
        message: &message,
    };
    let verification = signer::verify(&data, signature, expected)?;
    let parsed = parse_signature(signature)?;
    Ok(TransferVerification {
        is_valid: verification.is_valid,
        recovered: verification.recovered,
        v: 27 + u8::from(parsed.v()),
        r: B256::from(parsed.r().to_be_bytes::<32>()),
        s: B256::from(parsed.s().to_be_bytes::<32>()),
    })
}
