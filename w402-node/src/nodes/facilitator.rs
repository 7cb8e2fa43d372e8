//! `x402Facilitator`: forwards payments to a facilitator's HTTP API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use w402::NodeError;
use w402::node::{Node, NodeContext, Parameters, run_items};
use w402::proto::FacilitatorRequest;
use w402_http::constants::DEFAULT_FACILITATOR_URL;
use w402_http::facilitator::FacilitatorClient;

use crate::params;

/// Credential holding the facilitator endpoint and API key.
pub const FACILITATOR_CREDENTIAL: &str = "x402FacilitatorApi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Operation {
    Verify,
    Settle,
    Supported,
}

/// Calls `/verify`, `/settle` or `/supported`.
///
/// The base URL comes from the `x402FacilitatorApi` credential when present,
/// otherwise from the node itself.
#[derive(Debug, Clone)]
pub struct FacilitatorNode {
    base_url: String,
}

impl Default for FacilitatorNode {
    fn default() -> Self {
        Self::new(DEFAULT_FACILITATOR_URL)
    }
}

impl FacilitatorNode {
    /// Node falling back to `base_url` without a credential.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn client(&self, ctx: &dyn NodeContext) -> Result<FacilitatorClient, NodeError> {
        let base_url = ctx
            .credential_str(FACILITATOR_CREDENTIAL, "baseURL")
            .unwrap_or_else(|_| self.base_url.clone());
        let client = FacilitatorClient::try_from(base_url.as_str())?;
        match ctx.credential_str(FACILITATOR_CREDENTIAL, "apiKey") {
            Ok(api_key) => Ok(client.with_bearer(&api_key)?),
            Err(_) => Ok(client),
        }
    }

    async fn execute_item(
        ctx: &dyn NodeContext,
        client: &FacilitatorClient,
        item: usize,
    ) -> Result<Value, NodeError> {
        let operation: Operation = params::choice(ctx, "operation", item, "verify")?;
        let request = || -> Result<FacilitatorRequest, NodeError> {
            let payload = params::json(ctx, "paymentPayload", item)?.unwrap_or_default();
            let requirements = params::json(ctx, "paymentRequirements", item)?.unwrap_or_default();
            Ok(FacilitatorRequest::new(payload, requirements))
        };
        match operation {
            Operation::Verify => to_item(&client.verify(&request()?).await?),
            Operation::Settle => to_item(&client.settle(&request()?).await?),
            Operation::Supported => to_item(&client.supported().await?),
        }
    }
}

fn to_item<T: Serialize>(response: &T) -> Result<Value, NodeError> {
    serde_json::to_value(response)
        .map_err(|e| NodeError::protocol(format!("Unreadable facilitator response: {e}")))
}

#[async_trait]
impl Node for FacilitatorNode {
    fn name(&self) -> &'static str {
        "x402Facilitator"
    }

    async fn execute(&self, ctx: &dyn NodeContext) -> Result<Vec<Vec<Value>>, NodeError> {
        let client = self.client(ctx)?;
        let items = run_items(ctx, |item| Self::execute_item(ctx, &client, item)).await?;
        Ok(vec![items])
    }
}
