//! EIP-712 typed-data signing and signature recovery.
//!
//! Anything that can produce an EIP-712 signing hash implements
//! [`SigningHash`]: both statically typed `sol!` structs (through
//! [`TypedStruct`]) and arbitrary JSON typed data
//! ([`alloy_dyn_abi::TypedData`]). [`TypedDataSigner`] signs those hashes with a
//! local private key; [`recover_signer`] and [`verify`] go the other way.

use std::fmt;

use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, B256, Signature, hex};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{Eip712Domain, SolStruct};
use serde_json::{Value, json};
use w402::{ErrorKind, NodeError};

use crate::key::parse_private_key;

/// Signing or verification failure.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// Private key is not `0x` + 64 hex characters, or not a valid scalar.
    #[error("Invalid private key format. Must be a 64-character hex string (with or without 0x prefix)")]
    InvalidKeyFormat,
    /// Domain, types, primary type or message do not form valid typed data.
    #[error("Invalid typed data: {0}")]
    InvalidTypedData(String),
    /// Signature could not be parsed or recovered.
    #[error("Signature verification failed: {0}")]
    Verification(String),
    /// The underlying signer failed.
    #[error("Signing failed: {0}")]
    Signing(#[from] alloy_signer::Error),
}

impl SignerError {
    /// Error class of this failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKeyFormat | Self::InvalidTypedData(_) | Self::Verification(_) => {
                ErrorKind::Validation
            }
            Self::Signing(_) => ErrorKind::Configuration,
        }
    }
}

impl From<SignerError> for NodeError {
    fn from(err: SignerError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Source of an EIP-712 signing hash.
pub trait SigningHash {
    /// `keccak256("\x19\x01" || domainSeparator || hashStruct(message))`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidTypedData`] if the data cannot be encoded.
    fn signing_hash(&self) -> Result<B256, SignerError>;
}

impl SigningHash for TypedData {
    fn signing_hash(&self) -> Result<B256, SignerError> {
        self.eip712_signing_hash()
            .map_err(|e| SignerError::InvalidTypedData(e.to_string()))
    }
}

/// A `sol!` struct paired with its signing domain.
#[derive(Debug, Clone, Copy)]
pub struct TypedStruct<'a, T> {
    /// Signing domain.
    pub domain: &'a Eip712Domain,
    /// Message struct.
    pub message: &'a T,
}

impl<T: SolStruct> SigningHash for TypedStruct<'_, T> {
    fn signing_hash(&self) -> Result<B256, SignerError> {
        Ok(self.message.eip712_signing_hash(self.domain))
    }
}

/// Signs EIP-712 data with a local private key.
#[derive(Clone)]
pub struct TypedDataSigner {
    inner: PrivateKeySigner,
}

impl fmt::Debug for TypedDataSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedDataSigner")
            .field("address", &self.inner.address())
            .finish_non_exhaustive()
    }
}

impl From<PrivateKeySigner> for TypedDataSigner {
    fn from(inner: PrivateKeySigner) -> Self {
        Self { inner }
    }
}

impl TypedDataSigner {
    /// Builds a signer from a raw private key, normalizing it first.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKeyFormat`] on a malformed key.
    pub fn from_private_key(raw: &str) -> Result<Self, SignerError> {
        parse_private_key(raw).map(Self::from)
    }

    /// Address derived from the key.
    #[must_use]
    pub fn address(&self) -> Address {
        self.inner.address()
    }

    /// Signs the EIP-712 hash of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if the hash cannot be computed or signing fails.
    pub fn sign<H: SigningHash + ?Sized>(&self, data: &H) -> Result<Signature, SignerError> {
        let hash = data.signing_hash()?;
        Ok(self.inner.sign_hash_sync(&hash)?)
    }
}

/// Hex encoding of a 65-byte `r || s || v` signature, `0x`-prefixed.
#[must_use]
pub fn signature_hex(signature: &Signature) -> String {
    hex::encode_prefixed(signature.as_bytes())
}

/// Parses a hex signature of exactly 65 bytes.
///
/// # Errors
///
/// Returns [`SignerError::Verification`] if `raw` is not valid hex or has the
/// wrong length.
pub fn parse_signature(raw: &str) -> Result<Signature, SignerError> {
    let bytes = hex::decode(raw.trim())
        .map_err(|e| SignerError::Verification(format!("signature is not valid hex: {e}")))?;
    if bytes.len() != 65 {
        return Err(SignerError::Verification(format!(
            "signature must be 65 bytes, got {}",
            bytes.len()
        )));
    }
    Signature::from_raw(&bytes).map_err(|e| SignerError::Verification(e.to_string()))
}

/// Recovers the address that produced `signature` over `data`.
///
/// # Errors
///
/// Returns [`SignerError`] if the hash cannot be computed or recovery fails.
pub fn recover_signer<H: SigningHash + ?Sized>(
    data: &H,
    signature: &Signature,
) -> Result<Address, SignerError> {
    let hash = data.signing_hash()?;
    signature
        .recover_address_from_prehash(&hash)
        .map_err(|e| SignerError::Verification(e.to_string()))
}

/// Result of [`verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    /// `true` if the recovered address equals the expected one.
    pub is_valid: bool,
    /// Address recovered from the signature.
    pub recovered: Address,
}

/// Recovers the signer of `data` and compares it to `expected`.
///
/// `expected` is compared case-insensitively, so checksummed and lower-case
/// forms both match.
///
/// # Errors
///
/// Returns [`SignerError`] if the signature is malformed or recovery fails.
pub fn verify<H: SigningHash + ?Sized>(
    data: &H,
    signature: &str,
    expected: &str,
) -> Result<Verification, SignerError> {
    let signature = parse_signature(signature)?;
    let recovered = recover_signer(data, &signature)?;
    let is_valid = recovered
        .to_string()
        .eq_ignore_ascii_case(expected.trim());
    Ok(Verification {
        is_valid,
        recovered,
    })
}

/// Assembles JSON typed data from its parts.
///
/// `types` may omit `EIP712Domain`; it is derived from the domain fields.
///
/// # Errors
///
/// Returns [`SignerError::InvalidTypedData`] if the parts do not describe
/// valid typed data.
pub fn typed_data(
    domain: &Value,
    types: &Value,
    primary_type: &str,
    message: &Value,
) -> Result<TypedData, SignerError> {
    if !types.is_object() {
        return Err(SignerError::InvalidTypedData("types must be an object".to_owned()));
    }
    if types.get(primary_type).is_none() {
        return Err(SignerError::InvalidTypedData(format!(
            "primary type {primary_type:?} is not defined in types"
        )));
    }
    let raw = json!({
        "types": types,
        "primaryType": primary_type,
        "domain": domain,
        "message": message,
    });
    serde_json::from_value(raw).map_err(|e| SignerError::InvalidTypedData(e.to_string()))
}
