//! `erc3009Signer`: sign or verify an explicit `transferWithAuthorization`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;
use w402::NodeError;
use w402::networks::NetworkRegistry;
use w402::node::{Node, NodeContext, Parameters, run_items};
use w402_evm::erc3009::{TokenDomain, TransferRequest, sign_transfer, verify_transfer};
use w402_evm::{NetworkProvider, RpcTokenReader, TokenReader, TypedDataSigner};

use crate::params;
use crate::payment::EVM_PRIVATE_KEY_CREDENTIAL;

/// `blockchain` value selecting a custom RPC endpoint.
const CUSTOM_CHAIN: &str = "custom";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Operation {
    Sign,
    Verify,
}

/// ERC-3009 signer.
///
/// `blockchain` is a chain id, a registered network id, or `custom` together
/// with `customRpcUrl`. For a custom endpoint the chain id is read from it.
pub struct Erc3009Node {
    registry: Arc<NetworkRegistry>,
    networks: Arc<dyn NetworkProvider>,
}

impl fmt::Debug for Erc3009Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Erc3009Node")
            .field("networks", &self.registry.ids())
            .finish_non_exhaustive()
    }
}

impl Erc3009Node {
    /// Node resolving `blockchain` through `registry` and reading chains
    /// through `networks`.
    #[must_use]
    pub fn new(registry: Arc<NetworkRegistry>, networks: Arc<dyn NetworkProvider>) -> Self {
        Self { registry, networks }
    }

    /// Reader for the selected chain and the chain id, when known up front.
    fn chain(
        &self,
        ctx: &dyn NodeContext,
        item: usize,
    ) -> Result<(Arc<dyn TokenReader>, Option<u64>), NodeError> {
        let blockchain = ctx.required_str("blockchain", item)?;
        if blockchain.trim() == CUSTOM_CHAIN {
            let raw = ctx
                .required_str("customRpcUrl", item)
                .map_err(|_| NodeError::validation("Custom RPC URL is required"))?;
            let url = Url::parse(raw.trim())
                .map_err(|e| NodeError::validation(format!("Invalid custom RPC URL: {e}")))?;
            let reader: Arc<dyn TokenReader> = Arc::new(RpcTokenReader::new(url));
            return Ok((reader, None));
        }
        let entry = blockchain
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|chain_id| self.registry.by_chain_id(chain_id))
            .or_else(|| self.registry.resolve(&blockchain))
            .ok_or_else(|| NodeError::validation("Invalid blockchain selection"))?;
        let reader = self
            .networks
            .reader(&entry.id)
            .map_err(|e| NodeError::validation(e.to_string()))?;
        Ok((reader, Some(entry.chain_id)))
    }

    async fn execute_item(&self, ctx: &dyn NodeContext, item: usize) -> Result<Value, NodeError> {
        let operation: Operation = params::choice(ctx, "operation", item, "sign")?;
        let request = TransferRequest::parse(
            &ctx.required_str("tokenContract", item)?,
            &ctx.required_str("fromAddress", item)?,
            &ctx.required_str("toAddress", item)?,
            &ctx.required_str("value", item)?,
            ctx.u64_or("validAfter", item, 0),
            ctx.u64_or("validBefore", item, 0),
            &ctx.required_str("nonce", item)?,
        )?;
        let (reader, chain_id) = self.chain(ctx, item)?;
        let domain = TokenDomain::fetch(reader.as_ref(), request.token, chain_id).await?;

        match operation {
            Operation::Sign => {
                let key = ctx
                    .credential_str(EVM_PRIVATE_KEY_CREDENTIAL, "privateKey")
                    .map_err(|_| NodeError::validation("Private key is required"))?;
                let signer = TypedDataSigner::from_private_key(&key)?;
                Ok(sign_transfer(&signer, domain, &request)?.to_json())
            }
            Operation::Verify => {
                let signature = ctx.required_str("signatureToVerify", item)?;
                let expected = ctx.required_str("expectedSignerAddress", item)?;
                let verification = verify_transfer(&domain, &request, &signature, &expected)?;
                Ok(verification.to_json(&expected, &signature, &domain, &request.authorization))
            }
        }
    }
}

#[async_trait]
impl Node for Erc3009Node {
    fn name(&self) -> &'static str {
        "erc3009Signer"
    }

    async fn execute(&self, ctx: &dyn NodeContext) -> Result<Vec<Vec<Value>>, NodeError> {
        let items = run_items(ctx, |item| self.execute_item(ctx, item)).await?;
        Ok(vec![items])
    }
}
