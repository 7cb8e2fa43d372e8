//! `x402HttpResponse`: answers the triggering webhook with a 402 challenge
//! or a success reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use w402::NodeError;
use w402::networks::NetworkRegistry;
use w402::node::{Node, NodeContext, Parameters};
use w402_http::constants::{DEFAULT_CHALLENGE_ERROR, DEFAULT_MAX_TIMEOUT_SECONDS, DEFAULT_MIME_TYPE};
use w402_http::server::{
    ChallengeConfig, ResponseData, ResponseEmitter, ResponseMode, SettlementInfo, SuccessConfig,
};

use crate::params;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum ModeSelection {
    PaymentRequired,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum DataSelection {
    Json,
    Text,
    AllIncomingItems,
    FirstIncomingItem,
    NoData,
}

/// Sends the gate's reply. Parameters are read once, from the first item.
#[derive(Debug, Clone)]
pub struct ResponseNode {
    emitter: ResponseEmitter,
}

impl ResponseNode {
    /// Node canonicalizing network ids through `registry`.
    #[must_use]
    pub const fn new(registry: Arc<NetworkRegistry>) -> Self {
        Self {
            emitter: ResponseEmitter::new(registry),
        }
    }

    fn mode(ctx: &dyn NodeContext) -> Result<ResponseMode, NodeError> {
        let text = |name: &str| Some(ctx.str_or(name, 0, "")).filter(|s| !s.trim().is_empty());
        match params::choice(ctx, "responseMode", 0, "paymentRequired")? {
            ModeSelection::PaymentRequired => {
                let defaults = ChallengeConfig::default();
                Ok(ResponseMode::PaymentRequired(ChallengeConfig {
                    network: ctx.required_str("network", 0)?,
                    asset: ctx.required_str("asset", 0)?,
                    pay_to: ctx.required_str("payTo", 0)?,
                    amount_required: ctx.required_str("amountRequired", 0)?,
                    resource: text("resource"),
                    description: text("description"),
                    error: text("paymentRequiredMessage")
                        .unwrap_or_else(|| DEFAULT_CHALLENGE_ERROR.to_owned()),
                    mime_type: text("mimeType").unwrap_or_else(|| DEFAULT_MIME_TYPE.to_owned()),
                    max_timeout_seconds: ctx.u64_or(
                        "maxTimeoutSeconds",
                        0,
                        DEFAULT_MAX_TIMEOUT_SECONDS,
                    ),
                    extra: params::json(ctx, "extra", 0)?.unwrap_or(defaults.extra),
                }))
            }
            ModeSelection::Success => {
                let body = || ctx.str_or("responseBody", 0, "");
                let data = match params::choice(ctx, "responseData", 0, "json")? {
                    DataSelection::Json => match ctx.parameter("responseBody", 0) {
                        Some(Value::String(_) | Value::Null) | None => ResponseData::Json(body()),
                        Some(value) => ResponseData::Json(value.to_string()),
                    },
                    DataSelection::Text => ResponseData::Text(body()),
                    DataSelection::AllIncomingItems => ResponseData::AllIncomingItems,
                    DataSelection::FirstIncomingItem => ResponseData::FirstIncomingItem,
                    DataSelection::NoData => ResponseData::NoData,
                };
                let status = params::options(ctx, 0)
                    .get("responseCode")
                    .and_then(Value::as_u64)
                    .and_then(|code| u16::try_from(code).ok())
                    .unwrap_or(200);
                Ok(ResponseMode::Success(SuccessConfig {
                    data,
                    response_key: text("responseKey"),
                    status,
                    settlement: SettlementInfo {
                        transaction: ctx.str_or("transactionHash", 0, ""),
                        network: ctx.str_or("network", 0, ""),
                        payer: ctx.str_or("payerAddress", 0, ""),
                    },
                }))
            }
        }
    }

    fn headers(ctx: &dyn NodeContext) -> Vec<(String, String)> {
        let options = params::options(ctx, 0);
        options
            .get("responseHeaders")
            .and_then(|headers| headers.get("entries"))
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let name = entry.get("name")?.as_str()?.trim();
                        let value = match entry.get("value") {
                            Some(Value::String(s)) => s.clone(),
                            Some(Value::Null) | None => String::new(),
                            Some(other) => other.to_string(),
                        };
                        (!name.is_empty()).then(|| (name.to_owned(), value))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn reply(&self, ctx: &dyn NodeContext) -> Result<(), NodeError> {
        let mode = Self::mode(ctx)?;
        let emitted = self.emitter.emit(&mode, &Self::headers(ctx), ctx.items())?;
        tracing::info!(status = emitted.0.status, "sending webhook reply");
        ctx.respond(emitted.0);
        Ok(())
    }
}

#[async_trait]
impl Node for ResponseNode {
    fn name(&self) -> &'static str {
        "x402HttpResponse"
    }

    async fn execute(&self, ctx: &dyn NodeContext) -> Result<Vec<Vec<Value>>, NodeError> {
        match self.reply(ctx) {
            Ok(()) => Ok(vec![ctx.items().to_vec()]),
            Err(err) if ctx.continue_on_fail() => Ok(vec![vec![err.to_item()]]),
            Err(err) => Err(err.at_item(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use w402::ErrorKind;
    use w402::node::{ReplyBody, StaticContext};
    use w402::proto::{Base64Bytes, SettlementConfirmation};
    use w402_evm::networks::default_registry;

    fn node() -> ResponseNode {
        ResponseNode::new(Arc::new(default_registry()))
    }

    #[tokio::test]
    async fn test_payment_required_uses_canonical_network() {
        let ctx = StaticContext::single().with_parameters(&json!({
            "responseMode": "paymentRequired",
            "network": "base-sepolia-testnet",
            "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "amountRequired": "10000",
            "description": "Weather report",
        }));
        let out = node().execute(&ctx).await.unwrap();
        assert_eq!(out[0].len(), 1);

        let reply = ctx.take_reply().unwrap();
        assert_eq!(reply.status, 402);
        assert_eq!(reply.header("content-type"), Some("application/json"));
        let ReplyBody::Json(body) = reply.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["x402Version"], 1);
        assert_eq!(body["accepts"][0]["network"], "base-sepolia");
        assert_eq!(body["accepts"][0]["maxAmountRequired"], "10000");
        assert_eq!(body["accepts"][0]["maxTimeoutSeconds"], 60);
        assert_eq!(body["accepts"][0]["extra"], json!({"name": "USDC", "version": "2"}));
    }

    #[tokio::test]
    async fn test_success_with_settlement_header() {
        let ctx = StaticContext::new(vec![json!({"a": 1}), json!({"a": 2})]).with_parameters(&json!({
            "responseMode": "success",
            "responseData": "allIncomingItems",
            "responseKey": "data",
            "transactionHash": "0xfeed",
            "payerAddress": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "network": "base-sepolia-testnet",
            "options": {
                "responseCode": 201,
                "responseHeaders": {"entries": [{"name": "X-Trace", "value": "t-1"}]}
            }
        }));
        node().execute(&ctx).await.unwrap();

        let reply = ctx.take_reply().unwrap();
        assert_eq!(reply.status, 201);
        assert_eq!(reply.header("x-trace"), Some("t-1"));
        assert_eq!(reply.body, ReplyBody::Json(json!({"data": [{"a": 1}, {"a": 2}]})));
        let header = reply.header("x-payment-response").unwrap();
        let settlement: SettlementConfirmation = Base64Bytes::from(header).decode_json().unwrap();
        assert!(settlement.success);
        assert_eq!(settlement.transaction, "0xfeed");
        assert_eq!(settlement.network, "base-sepolia");
    }

    #[tokio::test]
    async fn test_success_without_settlement_omits_header() {
        let ctx = StaticContext::single().with_parameters(&json!({
            "responseMode": "success",
            "responseData": "text",
            "responseBody": "thanks",
        }));
        node().execute(&ctx).await.unwrap();
        let reply = ctx.take_reply().unwrap();
        assert!(reply.header("x-payment-response").is_none());
        assert_eq!(reply.header("content-type"), Some("text/plain"));
        assert_eq!(reply.body, ReplyBody::Text("thanks".to_owned()));
    }

    #[tokio::test]
    async fn test_invalid_template_is_configuration_error() {
        let params = json!({
            "responseMode": "success",
            "responseData": "json",
            "responseBody": "{broken",
        });
        let ctx = StaticContext::single().with_parameters(&params);
        let err = node().execute(&ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert_eq!(err.message, "Invalid JSON in 'Response Body' field");
        assert!(ctx.take_reply().is_none());

        let ctx = StaticContext::single()
            .with_parameters(&params)
            .with_continue_on_fail(true);
        let out = node().execute(&ctx).await.unwrap();
        assert_eq!(out[0][0], json!({"error": "Invalid JSON in 'Response Body' field"}));
    }
}
