//! `x402HttpEndpoint`: inbound trigger that splits paid from unpaid requests.
//!
//! Each input item is one inbound request,
//! `{headers, body, method, url, query}`. Output `0` receives requests that
//! carry a well-formed `X-PAYMENT` header, with the decoded object added as
//! `payment`; output `1` receives everything else. A malformed header never
//! raises an error.

use async_trait::async_trait;
use http::request::Parts;
use serde_json::{Map, Value};
use w402::NodeError;
use w402::node::{Node, NodeContext};
use w402_http::server::{Classification, classify_json};

/// Output index of requests carrying a payment.
pub const PAYMENT_PROVIDED_OUTPUT: usize = 0;

/// Output index of requests without one.
pub const MISSING_PAYMENT_OUTPUT: usize = 1;

/// Payment-gated webhook trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointNode;

impl EndpointNode {
    /// Builds the item for an inbound request.
    ///
    /// Header names are lower-cased. A JSON body is parsed, any other body is
    /// kept as text, and an empty body becomes `{}`.
    #[must_use]
    pub fn inbound_item(parts: &Parts, body: &[u8]) -> Value {
        let mut headers = Map::new();
        for (name, value) in &parts.headers {
            headers.insert(
                name.as_str().to_owned(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            );
        }
        let query: Map<String, Value> = parts
            .uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                    .collect()
            })
            .unwrap_or_default();
        let body = if body.is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
        };
        serde_json::json!({
            "headers": headers,
            "body": body,
            "method": parts.method.as_str(),
            "url": parts.uri.to_string(),
            "query": query,
        })
    }

    /// Classifies one inbound item.
    #[must_use]
    pub fn classify(item: &Value) -> Classification {
        item.get("headers")
            .map_or(Classification::MissingPayment, classify_json)
    }
}

#[async_trait]
impl Node for EndpointNode {
    fn name(&self) -> &'static str {
        "x402HttpEndpoint"
    }

    async fn execute(&self, ctx: &dyn NodeContext) -> Result<Vec<Vec<Value>>, NodeError> {
        let mut outputs = vec![Vec::new(), Vec::new()];
        for item in ctx.items() {
            let classification = Self::classify(item);
            let mut routed = item.clone();
            if let (Some(payment), Some(object)) = (classification.payment(), routed.as_object_mut()) {
                object.insert("payment".to_owned(), payment.clone());
            }
            tracing::debug!(output = classification.output(), "inbound request classified");
            outputs[classification.output()].push(routed);
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use w402::node::StaticContext;
    use w402::proto::Base64Bytes;

    fn header(payment: &Value) -> String {
        Base64Bytes::encode_json(payment).unwrap().to_string()
    }

    fn request(headers: Value) -> Value {
        json!({"headers": headers, "body": {}, "method": "POST", "url": "/paid", "query": {}})
    }

    #[tokio::test]
    async fn test_routes_paid_and_unpaid_requests() {
        let payment = json!({"x402Version": 1, "scheme": "exact", "network": "base-sepolia", "payload": {"signature": "0x01"}});
        let missing_scheme = json!({"x402Version": 1, "network": "base-sepolia", "payload": {}});
        let ctx = StaticContext::new(vec![
            request(json!({"X-Payment": header(&payment)})),
            request(json!({"x-payment": header(&missing_scheme)})),
            request(json!({"x-payment": "%%%not-base64"})),
            request(json!({})),
        ]);

        let outputs = EndpointNode.execute(&ctx).await.unwrap();
        assert_eq!(outputs[PAYMENT_PROVIDED_OUTPUT].len(), 1);
        assert_eq!(outputs[PAYMENT_PROVIDED_OUTPUT][0]["payment"], payment);
        assert_eq!(outputs[MISSING_PAYMENT_OUTPUT].len(), 3);
        assert!(outputs[MISSING_PAYMENT_OUTPUT].iter().all(|item| item.get("payment").is_none()));
    }

    #[test]
    fn test_inbound_item_shape() {
        let (parts, ()) = http::Request::builder()
            .method("POST")
            .uri("/paid?city=Lisbon&units=metric")
            .header("X-Custom", "yes")
            .body(())
            .unwrap()
            .into_parts();

        let item = EndpointNode::inbound_item(&parts, br#"{"order": 7}"#);
        assert_eq!(item["headers"]["x-custom"], "yes");
        assert_eq!(item["body"], json!({"order": 7}));
        assert_eq!(item["query"], json!({"city": "Lisbon", "units": "metric"}));
        assert_eq!(item["method"], "POST");

        let item = EndpointNode::inbound_item(&parts, b"plain");
        assert_eq!(item["body"], "plain");
        let item = EndpointNode::inbound_item(&parts, b"");
        assert_eq!(item["body"], json!({}));
    }
}
