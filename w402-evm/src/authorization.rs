//! Building signed `exact` payments from a 402 challenge.
//!
//! [`AuthorizationBuilder::build`] turns the server's [`PaymentRequirements`]
//! and the payer's private key into a [`PaymentPayload`] ready for the
//! `X-PAYMENT` header. It reads the chain id and the token's `name()` for the
//! EIP-712 domain and can check the payer's balance first. Any failure aborts
//! the build; a partial payload is never returned.

use std::str::FromStr;

use alloy_primitives::{Address, B256};
use rand::RngExt;
use rand::rng;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use w402::proto::{EXACT_SCHEME, PaymentPayload, PaymentRequirements, V1};
use w402::timestamp::UnixTimestamp;
use w402::{ErrorKind, NodeError};

use crate::key::parse_private_key;
use crate::reader::{NetworkProvider, ReadError};
use crate::signer::{SignerError, TypedDataSigner, TypedStruct};
use crate::types::{Eip3009Authorization, ExactEvmPayload, TokenAmount, transfer_domain};

/// Default backdating of `validAfter`, in seconds.
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;

/// Default length of the validity window, in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 3600;

/// Failure to build or validate an authorization.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    /// Key or signature problem.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// An address field does not parse.
    #[error("Invalid {field} address: {value:?}")]
    InvalidAddress {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },
    /// Nonce is not 32 bytes of hex.
    #[error("Invalid nonce format. Must be a 64-character hex string (32 bytes)")]
    InvalidNonce,
    /// The validity window has zero length.
    #[error("Invalid validity window: validBefore must be later than validAfter")]
    EmptyWindow,
    /// Amount is not a decimal integer.
    #[error("Invalid value. Must be a positive integer (in wei): {0:?}")]
    InvalidAmount(String),
    /// The network is not known.
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
    /// The RPC endpoint did not report a chain id.
    #[error("Failed to get chain ID from RPC: {0}")]
    ChainIdUnavailable(#[source] ReadError),
    /// The token `name()` call failed.
    #[error(
        "Failed to fetch token name: {0}. Make sure the contract supports the ERC-20 name() function."
    )]
    TokenMetadataUnavailable(#[source] ReadError),
    /// Balance lookup failed.
    #[error("Failed to fetch token balance: {0}")]
    BalanceUnavailable(#[source] ReadError),
    /// The payer cannot cover the required amount.
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// `maxAmountRequired`.
        required: TokenAmount,
        /// On-chain balance.
        available: TokenAmount,
    },
}

impl AuthorizationError {
    /// Error class of this failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Signer(err) => err.kind(),
            Self::InvalidAddress { .. }
            | Self::InvalidNonce
            | Self::EmptyWindow
            | Self::InvalidAmount(_)
            | Self::UnsupportedNetwork(_)
            | Self::InsufficientBalance { .. } => ErrorKind::Validation,
            Self::ChainIdUnavailable(_)
            | Self::TokenMetadataUnavailable(_)
            | Self::BalanceUnavailable(_) => ErrorKind::Network,
        }
    }
}

impl From<AuthorizationError> for NodeError {
    fn from(err: AuthorizationError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Parses a checksummed or lower-case address, naming `field` on failure.
///
/// # Errors
///
/// Returns [`AuthorizationError::InvalidAddress`].
pub fn parse_address(field: &'static str, value: &str) -> Result<Address, AuthorizationError> {
    Address::from_str(value.trim()).map_err(|_| AuthorizationError::InvalidAddress {
        field,
        value: value.to_owned(),
    })
}

/// Parses a 32-byte hex nonce, adding a missing `0x` prefix.
///
/// # Errors
///
/// Returns [`AuthorizationError::InvalidNonce`].
pub fn parse_nonce(value: &str) -> Result<B256, AuthorizationError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AuthorizationError::InvalidNonce);
    }
    B256::from_str(digits).map_err(|_| AuthorizationError::InvalidNonce)
}

/// Parses a decimal token amount.
///
/// # Errors
///
/// Returns [`AuthorizationError::InvalidAmount`].
pub fn parse_amount(value: &str) -> Result<TokenAmount, AuthorizationError> {
    value
        .parse()
        .map_err(|_| AuthorizationError::InvalidAmount(value.to_owned()))
}

/// Validity interval of a new authorization.
///
/// `validAfter` is backdated by `clock_skew_secs` so the payment is usable
/// immediately even if the verifier's clock lags; `validBefore` is
/// `validAfter + window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    /// Backdating of `validAfter`.
    pub clock_skew_secs: u64,
    /// Window length.
    pub window_secs: u64,
}

impl Default for ValidityWindow {
    fn default() -> Self {
        Self {
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

impl ValidityWindow {
    /// `(validAfter, validBefore)` relative to `now`.
    #[must_use]
    pub fn bounds(&self, now: UnixTimestamp) -> (UnixTimestamp, UnixTimestamp) {
        let valid_after = now.saturating_sub(self.clock_skew_secs);
        (valid_after, valid_after + self.window_secs)
    }
}

/// Builds signed ERC-3009 payments for the `exact` scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationBuilder {
    window: ValidityWindow,
    check_balance: bool,
}

impl AuthorizationBuilder {
    /// Builder with the default window and no balance check.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the validity window.
    #[must_use]
    pub const fn with_window(mut self, window: ValidityWindow) -> Self {
        self.window = window;
        self
    }

    /// Enables the pre-sign balance check.
    #[must_use]
    pub const fn with_balance_check(mut self, enabled: bool) -> Self {
        self.check_balance = enabled;
        self
    }

    /// Signs a `TransferWithAuthorization` for `requirements` with
    /// `private_key`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError`] if the window is empty, the key or any
    /// requirement field is malformed, the network is unknown, a chain read fails, or the balance
    /// check fails.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        network = %requirements.network,
        asset = %requirements.asset,
        amount = %requirements.max_amount_required
    )))]
    pub async fn build(
        &self,
        requirements: &PaymentRequirements,
        private_key: &str,
        networks: &dyn NetworkProvider,
    ) -> Result<PaymentPayload<ExactEvmPayload>, AuthorizationError> {
        if self.window.window_secs == 0 {
            return Err(AuthorizationError::EmptyWindow);
        }
        let signer = TypedDataSigner::from(parse_private_key(private_key)?);
        let asset = parse_address("asset", &requirements.asset)?;
        let pay_to = parse_address("payTo", &requirements.pay_to)?;
        let value = parse_amount(&requirements.max_amount_required)?;

        let reader = networks.reader(&requirements.network).map_err(|err| match err {
            ReadError::UnsupportedNetwork(network) => AuthorizationError::UnsupportedNetwork(network),
            other => AuthorizationError::ChainIdUnavailable(other),
        })?;
        let chain_id = reader
            .chain_id()
            .await
            .map_err(AuthorizationError::ChainIdUnavailable)?;
        let name = reader
            .token_name(asset)
            .await
            .map_err(AuthorizationError::TokenMetadataUnavailable)?;

        if self.check_balance {
            let balance = reader
                .balance_of(asset, signer.address())
                .await
                .map_err(AuthorizationError::BalanceUnavailable)?;
            if balance < value.0 {
                return Err(AuthorizationError::InsufficientBalance {
                    required: value,
                    available: balance.into(),
                });
            }
        }

        let (valid_after, valid_before) = self.window.bounds(UnixTimestamp::now());
        let nonce: [u8; 32] = rng().random();
        let authorization = Eip3009Authorization {
            from: signer.address(),
            to: pay_to,
            value,
            valid_after,
            valid_before,
            nonce: B256::from(nonce),
        };

        let domain = transfer_domain(name, chain_id, asset);
        let message = authorization.message();
        let signature = signer.sign(&TypedStruct {
            domain: &domain,
            message: &message,
        })?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(from = %authorization.from, chain_id, "signed payment authorization");

        Ok(PaymentPayload {
            x402_version: V1,
            scheme: EXACT_SCHEME.to_owned(),
            network: requirements.network.clone(),
            payload: ExactEvmPayload {
                signature: signature.as_bytes().into(),
                authorization,
            },
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use alloy_primitives::{Signature, U256, address};
    use alloy_transport::TransportErrorKind;
    use async_trait::async_trait;

    use super::*;
    use crate::reader::TokenReader;
    use crate::signer::recover_signer;

    pub(crate) const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    pub(crate) const SIGNER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    const ASSET: Address = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");
    const RECIPIENT: Address = address!("0x209693Bc6afc0C5328bA36FaF03C514EF312287C");

    #[derive(Debug, Clone)]
    pub(crate) struct FakeReader {
        pub(crate) chain_id: u64,
        pub(crate) name: Option<&'static str>,
        pub(crate) balance: U256,
    }

    #[async_trait]
    impl TokenReader for FakeReader {
        async fn chain_id(&self) -> Result<u64, ReadError> {
            Ok(self.chain_id)
        }

        async fn token_name(&self, _token: Address) -> Result<String, ReadError> {
            self.name
                .map(str::to_owned)
                .ok_or_else(|| TransportErrorKind::custom_str("execution reverted").into())
        }

        async fn balance_of(&self, _token: Address, _owner: Address) -> Result<U256, ReadError> {
            Ok(self.balance)
        }
    }

    pub(crate) struct FakeNetworks(pub(crate) FakeReader);

    impl NetworkProvider for FakeNetworks {
        fn reader(&self, network: &str) -> Result<Arc<dyn TokenReader>, ReadError> {
            if network == "base-sepolia" {
                Ok(Arc::new(self.0.clone()))
            } else {
                Err(ReadError::UnsupportedNetwork(network.to_owned()))
            }
        }
    }

    fn networks() -> FakeNetworks {
        FakeNetworks(FakeReader {
            chain_id: 84532,
            name: Some("USDC"),
            balance: U256::from(5_000_000u64),
        })
    }

    fn requirements() -> PaymentRequirements {
        serde_json::from_value(serde_json::json!({
            "scheme": "exact",
            "network": "base-sepolia",
            "maxAmountRequired": "1000000",
            "asset": ASSET.to_string(),
            "payTo": RECIPIENT.to_string(),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_signs_recoverable_authorization() {
        let payload = AuthorizationBuilder::new()
            .build(&requirements(), KEY, &networks())
            .await
            .unwrap();
        assert_eq!(payload.scheme, "exact");
        assert_eq!(payload.network, "base-sepolia");

        let auth = payload.payload.authorization;
        assert_eq!(auth.from, SIGNER);
        assert_eq!(auth.to, RECIPIENT);
        assert_eq!(auth.value.to_string(), "1000000");
        assert_eq!(auth.valid_before.as_secs() - auth.valid_after.as_secs(), 3600);
        assert!(auth.valid_after.as_secs() <= UnixTimestamp::now().as_secs() - 60);

        let domain = transfer_domain("USDC".to_owned(), 84532, ASSET);
        let signature = Signature::from_raw(&payload.payload.signature).unwrap();
        let recovered = recover_signer(
            &TypedStruct {
                domain: &domain,
                message: &auth.message(),
            },
            &signature,
        )
        .unwrap();
        assert_eq!(recovered, SIGNER);
    }

    #[tokio::test]
    async fn test_nonces_are_fresh() {
        let builder = AuthorizationBuilder::new();
        let a = builder.build(&requirements(), KEY, &networks()).await.unwrap();
        let b = builder.build(&requirements(), KEY, &networks()).await.unwrap();
        assert_ne!(a.payload.authorization.nonce, b.payload.authorization.nonce);
    }

    #[tokio::test]
    async fn test_build_fails_fast_on_bad_input() {
        let builder = AuthorizationBuilder::new();
        let err = builder.build(&requirements(), "0x1234", &networks()).await.unwrap_err();
        assert!(matches!(err, AuthorizationError::Signer(SignerError::InvalidKeyFormat)));

        let mut req = requirements();
        req.network = "polygon".to_owned();
        let err = builder.build(&req, KEY, &networks()).await.unwrap_err();
        assert!(matches!(err, AuthorizationError::UnsupportedNetwork(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut req = requirements();
        req.max_amount_required = "1e6".to_owned();
        let err = builder.build(&req, KEY, &networks()).await.unwrap_err();
        assert!(matches!(err, AuthorizationError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_token_name_failure_is_fatal() {
        let mut networks = networks();
        networks.0.name = None;
        let err = AuthorizationBuilder::new()
            .build(&requirements(), KEY, &networks)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizationError::TokenMetadataUnavailable(_)));
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.to_string().starts_with("Failed to fetch token name"));
    }

    #[tokio::test]
    async fn test_balance_check() {
        let mut networks = networks();
        networks.0.balance = U256::from(10u64);
        let unchecked = AuthorizationBuilder::new()
            .build(&requirements(), KEY, &networks)
            .await;
        assert!(unchecked.is_ok());

        let err = AuthorizationBuilder::new()
            .with_balance_check(true)
            .build(&requirements(), KEY, &networks)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizationError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_parse_nonce() {
        let hex = "ab".repeat(32);
        assert_eq!(parse_nonce(&hex).unwrap(), B256::repeat_byte(0xab));
        assert_eq!(parse_nonce(&format!(" 0x{hex} ")).unwrap(), B256::repeat_byte(0xab));
        assert!(parse_nonce("0x1234").is_err());
        assert!(parse_nonce(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_window_bounds() {
        let window = ValidityWindow {
            clock_skew_secs: 60,
            window_secs: 600,
        };
        let (after, before) = window.bounds(UnixTimestamp::from_secs(1_000));
        assert_eq!(after.as_secs(), 940);
        assert_eq!(before.as_secs(), 1_540);
    }

    #[tokio::test]
    async fn test_empty_window_is_rejected() {
        let err = AuthorizationBuilder::new()
            .with_window(ValidityWindow {
                clock_skew_secs: 60,
                window_secs: 0,
            })
            .build(&requirements(), KEY, &networks())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizationError::EmptyWindow));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let payload = AuthorizationBuilder::new()
            .with_window(ValidityWindow {
                clock_skew_secs: 0,
                window_secs: 1,
            })
            .build(&requirements(), KEY, &networks())
            .await
            .unwrap();
        let auth = payload.payload.authorization;
        assert!(auth.valid_after < auth.valid_before);
    }
}
