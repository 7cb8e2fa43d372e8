//! `x402HttpRequest`: HTTP request with automatic x402 payment.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use w402::NodeError;
use w402::node::{Node, NodeContext, Parameters, run_items};
use w402::proto::PaymentRequirements;
use w402_evm::{AuthorizationBuilder, NetworkProvider};
use w402_http::client::{
    PaymentChallengeClient, PaymentMode, RequestOptions, RequestSpec,
};

use crate::params;
use crate::payment::{EVM_PRIVATE_KEY_CREDENTIAL, EvmPaymentSigner};

/// How payment is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum PaymentSelection {
    /// Pay when challenged.
    Auto,
    /// Pay the configured requirements up front.
    Manual,
}

/// Issues a request, pays a 402 challenge once, and reports the settlement.
pub struct RequestNode {
    networks: Arc<dyn NetworkProvider>,
    builder: AuthorizationBuilder,
}

impl fmt::Debug for RequestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestNode")
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

impl RequestNode {
    /// Node resolving payment networks through `networks`.
    #[must_use]
    pub fn new(networks: Arc<dyn NetworkProvider>) -> Self {
        Self {
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

    fn request_spec(ctx: &dyn NodeContext, item: usize) -> Result<RequestSpec, NodeError> {
        let method = ctx.str_or("method", item, "GET");
        let url = ctx.required_str("url", item)?;
        let mut spec = RequestSpec::parse(&method, &url)?;
        for (name, value) in params::pairs(ctx, "urlParameters", "parameters", item) {
            spec = spec.with_query(name, value);
        }
        for (name, value) in params::pairs(ctx, "headers", "header", item) {
            spec = spec.with_header(name, value);
        }
        if spec.can_have_body() {
            spec = match ctx.parameter("body", item) {
                Some(Value::String(text)) => spec.with_body_text(&text)?,
                Some(Value::Null) | None => spec,
                Some(body) => spec.with_body(body),
            };
        }
        Ok(spec)
    }

    fn request_options(ctx: &dyn NodeContext, item: usize) -> RequestOptions {
        let options = params::options(ctx, item);
        let defaults = RequestOptions::default();
        let timeout_ms = options
            .get("timeout")
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0);
        RequestOptions {
            timeout: timeout_ms.map_or(defaults.timeout, Duration::from_millis),
            follow_redirects: options
                .get("followRedirects")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.follow_redirects),
            max_redirects: options
                .get("maxRedirects")
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.max_redirects),
        }
    }

    fn payment_mode(ctx: &dyn NodeContext, item: usize) -> Result<PaymentMode, NodeError> {
        match params::choice(ctx, "paymentMode", item, "auto")? {
            PaymentSelection::Auto => Ok(PaymentMode::Auto),
            PaymentSelection::Manual => {
                let accept = params::json(ctx, "paymentRequirements", item)?.ok_or_else(|| {
                    NodeError::validation("Payment requirements are required in manual mode")
                })?;
                let requirements = PaymentRequirements::from_accept(&accept)
                    .map_err(|e| NodeError::validation(e.to_string()))?;
                Ok(PaymentMode::Manual(requirements))
            }
        }
    }

    async fn execute_item(&self, ctx: &dyn NodeContext, item: usize) -> Result<Value, NodeError> {
        let spec = Self::request_spec(ctx, item)?;
        let mode = Self::payment_mode(ctx, item)?;
        let check_balance = params::options(ctx, item)
            .get("checkBalance")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let signer = EvmPaymentSigner::new(
            ctx.credential_str(EVM_PRIVATE_KEY_CREDENTIAL, "privateKey").ok(),
            Arc::clone(&self.networks),
        )
        .with_builder(self.builder.with_balance_check(check_balance));
        let client = PaymentChallengeClient::new(signer, Self::request_options(ctx, item))?;
        let outcome = client.execute(&spec, &mode, &ctx.cancellation()).await?;
        tracing::debug!(
            item,
            status = outcome.response().status,
            paid = outcome.settlement().is_some(),
            "request finished"
        );
        Ok(outcome.to_item())
    }
}

#[async_trait]
impl Node for RequestNode {
    fn name(&self) -> &'static str {
        "x402HttpRequest"
    }

    async fn execute(&self, ctx: &dyn NodeContext) -> Result<Vec<Vec<Value>>, NodeError> {
        let items = run_items(ctx, |item| self.execute_item(ctx, item)).await?;
        Ok(vec![items])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::tests::{FakeNetworks, KEY, SIGNER};
    use serde_json::json;
    use w402::ErrorKind;
    use w402::node::StaticContext;
    use w402::proto::{Base64Bytes, PaymentPayload};
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn node() -> RequestNode {
        RequestNode::new(Arc::new(FakeNetworks))
    }

    fn challenge() -> Value {
        json!({
            "x402Version": 1,
            "error": "Payment required to access this resource",
            "accepts": [{
                "scheme": "exact",
                "network": "base-sepolia",
                "maxAmountRequired": "10000",
                "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
            }]
        })
    }

    async fn paid_server() -> MockServer {
        let server = MockServer::start().await;
        let settlement = Base64Bytes::encode_json(&json!({
            "success": true,
            "transaction": "0xabc123",
            "network": "base-sepolia",
            "payer": SIGNER
        }))
        .unwrap()
        .to_string();
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(header_exists("x-payment"))
            .respond_with(move |request: &Request| {
                let header = request.headers.get("x-payment").unwrap().to_str().unwrap();
                let payment: PaymentPayload =
                    Base64Bytes::from(header).decode_json().unwrap();
                assert_eq!(payment.payload["authorization"]["value"], "10000");
                ResponseTemplate::new(200)
                    .insert_header("X-PAYMENT-RESPONSE", settlement.as_str())
                    .set_body_json(json!({"forecast": "sunny"}))
            })
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(402).set_body_json(challenge()))
            .with_priority(10)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_pays_challenge_and_reports_settlement() {
        let server = paid_server().await;
        let ctx = StaticContext::single()
            .with_parameter("method", "GET")
            .with_parameter("url", format!("{}/weather", server.uri()))
            .with_credential(EVM_PRIVATE_KEY_CREDENTIAL, json!({"privateKey": KEY}));

        let out = node().execute(&ctx).await.unwrap();
        let item = &out[0][0];
        assert_eq!(item["status"], 200);
        assert_eq!(item["data"], json!({"forecast": "sunny"}));
        assert_eq!(item["paymentResponse"]["transaction"], "0xabc123");
        assert_eq!(item["method"], "GET");
    }

    #[tokio::test]
    async fn test_unpaid_request_passes_query_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/free"))
            .and(query_param("city", "Lisbon"))
            .and(wiremock::matchers::header("x-api", "1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .mount(&server)
            .await;
        let ctx = StaticContext::single()
            .with_parameter("url", format!("{}/free", server.uri()))
            .with_parameter("urlParameters", json!({"parameters": [{"name": "city", "value": "Lisbon"}]}))
            .with_parameter("headers", json!({"header": [{"name": "X-Api", "value": "1"}]}));

        let out = node().execute(&ctx).await.unwrap();
        let item = &out[0][0];
        assert_eq!(item["status"], 404);
        assert_eq!(item["data"], "nope");
        assert_eq!(item["paymentResponse"], Value::Null);
    }

    #[tokio::test]
    async fn test_challenge_without_key_fails_per_item() {
        let server = paid_server().await;
        let ctx = StaticContext::single()
            .with_parameter("url", format!("{}/weather", server.uri()))
            .with_continue_on_fail(true);
        let out = node().execute(&ctx).await.unwrap();
        assert_eq!(out[0][0], json!({"error": "Private key is required for write operations"}));
    }

    #[tokio::test]
    async fn test_invalid_body_is_validation_error() {
        let ctx = StaticContext::single()
            .with_parameter("method", "POST")
            .with_parameter("url", "http://127.0.0.1:9/never")
            .with_parameter("body", "{not json");
        let err = node().execute(&ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.starts_with("Invalid JSON body"));
        assert_eq!(err.item, Some(0));
    }

    #[tokio::test]
    async fn test_manual_mode_requires_requirements() {
        let ctx = StaticContext::single()
            .with_parameter("url", "http://127.0.0.1:9/never")
            .with_parameter("paymentMode", "manual");
        let err = node().execute(&ctx).await.unwrap_err();
        assert_eq!(err.message, "Payment requirements are required in manual mode");
    }

    #[test]
    fn test_request_options_from_collection() {
        let ctx = StaticContext::single().with_parameter(
            "options",
            json!({"timeout": 2500, "followRedirects": false, "maxRedirects": 2}),
        );
        let options = RequestNode::request_options(&ctx, 0);
        assert_eq!(options.timeout, Duration::from_millis(2500));
        assert!(!options.follow_redirects);
        assert_eq!(options.max_redirects, 2);
        let defaults = RequestNode::request_options(&StaticContext::single(), 0);
        assert_eq!(defaults, RequestOptions::default());
    }
}
