//! Bridges the HTTP client's signing hook to the EVM authorization builder.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use w402::NodeError;
use w402::proto::{PaymentPayload, PaymentRequirements};
use w402_evm::{AuthorizationBuilder, NetworkProvider};
use w402_http::client::PaymentSigner;

/// Credential holding the payer key.
pub const EVM_PRIVATE_KEY_CREDENTIAL: &str = "evmPrivateKey";

/// Signs `exact` payments with an ERC-3009 authorization.
///
/// The key is only needed once a challenge arrives, so a missing key is
/// reported at signing time, not at construction.
pub struct EvmPaymentSigner {
    private_key: Option<String>,
    networks: Arc<dyn NetworkProvider>,
    builder: AuthorizationBuilder,
}

impl fmt::Debug for EvmPaymentSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmPaymentSigner")
            .field("has_key", &self.private_key.is_some())
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

impl EvmPaymentSigner {
    /// Signer resolving chains through `networks`.
    #[must_use]
    pub fn new(private_key: Option<String>, networks: Arc<dyn NetworkProvider>) -> Self {
        Self {
            private_key,
            networks,
            builder: AuthorizationBuilder::new(),
        }
    }

    /// Replaces the authorization builder.
    #[must_use]
    pub const fn with_builder(mut self, builder: AuthorizationBuilder) -> Self {
        self.builder = builder;
        self
    }
}

#[async_trait]
impl PaymentSigner for EvmPaymentSigner {
    async fn sign_payment(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, NodeError> {
        let key = self
            .private_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| NodeError::validation("Private key is required for write operations"))?;
        let signed = self
            .builder
            .build(requirements, key, self.networks.as_ref())
            .await?;
        let payload = serde_json::to_value(&signed.payload)
            .map_err(|e| NodeError::configuration(format!("Failed to encode payment: {e}")))?;
        Ok(PaymentPayload {
            x402_version: signed.x402_version,
            scheme: signed.scheme,
            network: signed.network,
            payload,
        })
    }
}
