use std::sync::Arc;

use serde_json::{Map, Value, json};
use w402::NodeError;
use w402::networks::NetworkRegistry;
use w402::node::{ReplyBody, WebhookReply};
use w402::proto::{EXACT_SCHEME, PaymentRequired, PaymentRequirements, SettlementConfirmation, V1};

use crate::constants::{
    DEFAULT_CHALLENGE_ERROR, DEFAULT_MAX_TIMEOUT_SECONDS, DEFAULT_MIME_TYPE,
    HTTP_STATUS_PAYMENT_REQUIRED, X_PAYMENT_RESPONSE_HEADER,
};
use crate::error::HeaderError;
use crate::headers::encode_payment_response;

const CONTENT_TYPE: &str = "content-type";

/// Failure to build a reply.
#[derive(Debug, thiserror::Error)]
pub enum EmitterError {
    /// The fixed JSON body template does not parse.
    #[error("Invalid JSON in 'Response Body' field")]
    InvalidJsonBody(#[source] serde_json::Error),
    /// The challenge body could not be serialized.
    #[error("Failed to serialize payment challenge: {0}")]
    Challenge(#[source] serde_json::Error),
    /// The settlement header could not be encoded.
    #[error(transparent)]
    Header(#[from] HeaderError),
}

impl From<EmitterError> for NodeError {
    fn from(err: EmitterError) -> Self {
        let node_error = Self::configuration(err.to_string());
        if let EmitterError::InvalidJsonBody(source) = &err {
            return node_error.with_description(format!(
                "Check that the syntax of the JSON in the 'Response Body' parameter is valid: {source}"
            ));
        }
        node_error
    }
}

/// Terms advertised in a 402 challenge.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeConfig {
    /// Network id or alias. Emitted in canonical form.
    pub network: String,
    /// Token contract.
    pub asset: String,
    /// Recipient.
    pub pay_to: String,
    /// Amount in the token's smallest unit.
    pub amount_required: String,
    /// Protected resource URL.
    pub resource: Option<String>,
    /// Human-readable description.
    pub description: Option<String>,
    /// `error` text of the body.
    pub error: String,
    /// `mimeType` of the resource.
    pub mime_type: String,
    /// `maxTimeoutSeconds`.
    pub max_timeout_seconds: u64,
    /// Signing-domain metadata for the asset.
    pub extra: Value,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            network: String::new(),
            asset: String::new(),
            pay_to: String::new(),
            amount_required: String::new(),
            resource: None,
            description: None,
            error: DEFAULT_CHALLENGE_ERROR.to_owned(),
            mime_type: DEFAULT_MIME_TYPE.to_owned(),
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            extra: json!({"name": "USDC", "version": "2"}),
        }
    }
}

/// How the success body is shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseData {
    /// A fixed JSON template. Blank means `{}`.
    Json(String),
    /// A fixed text body, sent as `text/plain`.
    Text(String),
    /// Every incoming item.
    AllIncomingItems,
    /// The first incoming item.
    FirstIncomingItem,
    /// No body.
    NoData,
}

/// Settlement facts to echo in `X-PAYMENT-RESPONSE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementInfo {
    /// Transaction hash.
    pub transaction: String,
    /// Network id or alias. Emitted in canonical form.
    pub network: String,
    /// Payer address.
    pub payer: String,
}

/// Success reply settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessConfig {
    /// Body strategy.
    pub data: ResponseData,
    /// Wraps incoming-item bodies as `{key: items}` when set.
    pub response_key: Option<String>,
    /// Status code.
    pub status: u16,
    /// Settlement header source.
    pub settlement: SettlementInfo,
}

impl Default for SuccessConfig {
    fn default() -> Self {
        Self {
            data: ResponseData::NoData,
            response_key: None,
            status: 200,
            settlement: SettlementInfo::default(),
        }
    }
}

/// Which reply to send.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseMode {
    /// A 402 challenge.
    PaymentRequired(ChallengeConfig),
    /// A success reply.
    Success(SuccessConfig),
}

/// A built reply, convertible into an axum response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedResponse(pub WebhookReply);

/// Builds gate replies.
#[derive(Debug, Clone)]
pub struct ResponseEmitter {
    registry: Arc<NetworkRegistry>,
}

impl ResponseEmitter {
    /// Emitter that canonicalizes network ids through `registry`.
    #[must_use]
    pub const fn new(registry: Arc<NetworkRegistry>) -> Self {
        Self { registry }
    }

    /// Builds the reply for `mode`.
    ///
    /// `headers` are operator-supplied; names are lower-cased. `items` are
    /// the incoming items used by the pass-through strategies.
    ///
    /// # Errors
    ///
    /// Returns [`EmitterError`] on an invalid JSON template or an encoding
    /// failure.
    pub fn emit(
        &self,
        mode: &ResponseMode,
        headers: &[(String, String)],
        items: &[Value],
    ) -> Result<EmittedResponse, EmitterError> {
        let mut reply_headers = Vec::with_capacity(headers.len() + 2);
        for (name, value) in headers {
            set_header(&mut reply_headers, name, value);
        }
        let reply = match mode {
            ResponseMode::PaymentRequired(config) => {
                set_header(&mut reply_headers, CONTENT_TYPE, DEFAULT_MIME_TYPE);
                let body = serde_json::to_value(self.challenge(config))
                    .map_err(EmitterError::Challenge)?;
                WebhookReply {
                    status: HTTP_STATUS_PAYMENT_REQUIRED,
                    headers: reply_headers,
                    body: ReplyBody::Json(body),
                }
            }
            ResponseMode::Success(config) => self.success(config, reply_headers, items)?,
        };
        #[cfg(feature = "telemetry")]
        tracing::debug!(status = reply.status, "emitted gate response");
        Ok(EmittedResponse(reply))
    }

    /// The 402 body for `config`.
    #[must_use]
    pub fn challenge(&self, config: &ChallengeConfig) -> PaymentRequired {
        let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.is_empty());
        PaymentRequired {
            x402_version: V1,
            error: config.error.clone(),
            accepts: vec![PaymentRequirements {
                scheme: EXACT_SCHEME.to_owned(),
                network: self.registry.canonical(&config.network),
                max_amount_required: config.amount_required.clone(),
                resource: non_empty(&config.resource),
                description: non_empty(&config.description),
                mime_type: Some(config.mime_type.clone()),
                output_schema: None,
                pay_to: config.pay_to.clone(),
                max_timeout_seconds: Some(config.max_timeout_seconds),
                asset: config.asset.clone(),
                extra: Some(config.extra.clone()),
            }],
        }
    }

    /// The settlement confirmation for `info`, or `None` when the
    /// transaction hash or payer is blank.
    #[must_use]
    pub fn settlement(&self, info: &SettlementInfo) -> Option<SettlementConfirmation> {
        let transaction = info.transaction.trim();
        let payer = info.payer.trim();
        if transaction.is_empty() || payer.is_empty() {
            return None;
        }
        Some(SettlementConfirmation {
            success: true,
            transaction: transaction.to_owned(),
            network: self.registry.canonical(&info.network),
            payer: payer.to_owned(),
            error_reason: None,
        })
    }

    fn success(
        &self,
        config: &SuccessConfig,
        mut headers: Vec<(String, String)>,
        items: &[Value],
    ) -> Result<WebhookReply, EmitterError> {
        let wrap = |value: Value| match config.response_key.as_deref() {
            Some(key) if !key.is_empty() => {
                let mut map = Map::new();
                map.insert(key.to_owned(), value);
                Value::Object(map)
            }
            _ => value,
        };
        let body = match &config.data {
            ResponseData::Json(template) if template.trim().is_empty() => {
                ReplyBody::Json(Value::Object(Map::new()))
            }
            ResponseData::Json(template) => ReplyBody::Json(
                serde_json::from_str(template).map_err(EmitterError::InvalidJsonBody)?,
            ),
            ResponseData::Text(text) => {
                set_header(&mut headers, CONTENT_TYPE, "text/plain");
                ReplyBody::Text(text.clone())
            }
            ResponseData::AllIncomingItems => ReplyBody::Json(wrap(Value::Array(items.to_vec()))),
            ResponseData::FirstIncomingItem => ReplyBody::Json(wrap(
                items
                    .first()
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new())),
            )),
            ResponseData::NoData => ReplyBody::Empty,
        };
        if matches!(body, ReplyBody::Json(_)) && !has_header(&headers, CONTENT_TYPE) {
            set_header(&mut headers, CONTENT_TYPE, DEFAULT_MIME_TYPE);
        }
        if let Some(confirmation) = self.settlement(&config.settlement) {
            let encoded = encode_payment_response(&confirmation)?;
            set_header(&mut headers, X_PAYMENT_RESPONSE_HEADER, &encoded);
        }
        Ok(WebhookReply {
            status: config.status,
            headers,
            body,
        })
    }
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name))
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() {
        return;
    }
    headers.retain(|(key, _)| *key != name);
    headers.push((name, value.to_owned()));
}

#[cfg(feature = "server")]
mod axum_response {
    use axum_core::body::Body;
    use axum_core::response::{IntoResponse, Response};
    use http::{HeaderName, HeaderValue, StatusCode};
    use w402::node::ReplyBody;

    use super::EmittedResponse;

    impl IntoResponse for EmittedResponse {
        fn into_response(self) -> Response {
            let reply = self.0;
            let body = match reply.body {
                ReplyBody::Json(value) => match serde_json::to_vec(&value) {
                    Ok(bytes) => Body::from(bytes),
                    Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                },
                ReplyBody::Text(text) => Body::from(text),
                ReplyBody::Empty => Body::empty(),
            };
            let mut response = Response::new(body);
            *response.status_mut() =
                StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            for (name, value) in reply.headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(&value),
                ) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().insert(name, value);
                    }
                    _ => {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(header = %name, "dropping invalid response header");
                    }
                }
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::decode_payment_response;
    use w402::networks::NetworkInfo;

    fn emitter() -> ResponseEmitter {
        let registry = NetworkRegistry::from_networks(&[NetworkInfo {
            id: "base-sepolia",
            chain_id: 84532,
            rpc_url: "https://sepolia.base.org",
        }])
        .with_alias("base-sepolia-testnet", "base-sepolia");
        ResponseEmitter::new(Arc::new(registry))
    }

    fn challenge() -> ChallengeConfig {
        ChallengeConfig {
            network: "base-sepolia-testnet".to_owned(),
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_owned(),
            pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_owned(),
            amount_required: "10000".to_owned(),
            resource: Some("https://api.example.com/report".to_owned()),
            ..ChallengeConfig::default()
        }
    }

    #[test]
    fn test_challenge_uses_canonical_network() {
        let EmittedResponse(reply) = emitter()
            .emit(&ResponseMode::PaymentRequired(challenge()), &[], &[])
            .unwrap();
        assert_eq!(reply.status, 402);
        assert_eq!(reply.header("Content-Type"), Some("application/json"));
        let ReplyBody::Json(body) = reply.body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["x402Version"], 1);
        assert_eq!(body["error"], DEFAULT_CHALLENGE_ERROR);
        let accept = &body["accepts"][0];
        assert_eq!(accept["network"], "base-sepolia");
        assert_eq!(accept["scheme"], "exact");
        assert_eq!(accept["maxAmountRequired"], "10000");
        assert_eq!(accept["maxTimeoutSeconds"], 60);
        assert_eq!(accept["mimeType"], "application/json");
        assert_eq!(accept["extra"], json!({"name": "USDC", "version": "2"}));
        assert!(accept.get("description").is_none());
    }

    #[test]
    fn test_settlement_header_needs_hash_and_payer() {
        let mut config = SuccessConfig {
            data: ResponseData::Json(r#"{"ok": true}"#.to_owned()),
            ..SuccessConfig::default()
        };
        let mode = ResponseMode::Success(config.clone());
        let EmittedResponse(reply) = emitter().emit(&mode, &[], &[]).unwrap();
        assert!(reply.header(X_PAYMENT_RESPONSE_HEADER).is_none());
        assert_eq!(reply.body, ReplyBody::Json(json!({"ok": true})));

        config.settlement = SettlementInfo {
            transaction: "0xabc".to_owned(),
            network: "base-sepolia-testnet".to_owned(),
            payer: String::new(),
        };
        let EmittedResponse(reply) = emitter()
            .emit(&ResponseMode::Success(config.clone()), &[], &[])
            .unwrap();
        assert!(reply.header(X_PAYMENT_RESPONSE_HEADER).is_none());

        config.settlement.payer = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_owned();
        let EmittedResponse(reply) = emitter()
            .emit(&ResponseMode::Success(config), &[], &[])
            .unwrap();
        let header = reply.header(X_PAYMENT_RESPONSE_HEADER).unwrap();
        let decoded = decode_payment_response(header).unwrap();
        assert!(decoded.success);
        assert_eq!(decoded.transaction, "0xabc");
        assert_eq!(decoded.network, "base-sepolia");
        assert_eq!(decoded.payer, "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    }

    #[test]
    fn test_invalid_json_template_is_configuration_error() {
        let mode = ResponseMode::Success(SuccessConfig {
            data: ResponseData::Json("{not json".to_owned()),
            ..SuccessConfig::default()
        });
        let err = emitter().emit(&mode, &[], &[]).unwrap_err();
        let node_error = NodeError::from(err);
        assert_eq!(node_error.kind, w402::ErrorKind::Configuration);
        assert_eq!(node_error.message, "Invalid JSON in 'Response Body' field");
        assert!(node_error.description.is_some());
    }

    #[test]
    fn test_item_strategies_and_headers() {
        let items = vec![json!({"a": 1}), json!({"a": 2})];
        let headers = vec![("X-Custom".to_owned(), "yes".to_owned())];
        let mode = ResponseMode::Success(SuccessConfig {
            data: ResponseData::AllIncomingItems,
            response_key: Some("data".to_owned()),
            status: 201,
            ..SuccessConfig::default()
        });
        let EmittedResponse(reply) = emitter().emit(&mode, &headers, &items).unwrap();
        assert_eq!(reply.status, 201);
        assert_eq!(reply.headers[0], ("x-custom".to_owned(), "yes".to_owned()));
        assert_eq!(reply.body, ReplyBody::Json(json!({"data": items.clone()})));

        let mode = ResponseMode::Success(SuccessConfig {
            data: ResponseData::FirstIncomingItem,
            ..SuccessConfig::default()
        });
        let EmittedResponse(reply) = emitter().emit(&mode, &[], &items).unwrap();
        assert_eq!(reply.body, ReplyBody::Json(json!({"a": 1})));

        let mode = ResponseMode::Success(SuccessConfig {
            data: ResponseData::Text("hello".to_owned()),
            ..SuccessConfig::default()
        });
        let EmittedResponse(reply) = emitter().emit(&mode, &[], &items).unwrap();
        assert_eq!(reply.header("content-type"), Some("text/plain"));
        assert_eq!(reply.body, ReplyBody::Text("hello".to_owned()));

        let mode = ResponseMode::Success(SuccessConfig::default());
        let EmittedResponse(reply) = emitter().emit(&mode, &[], &items).unwrap();
        assert_eq!(reply.body, ReplyBody::Empty);
        assert!(reply.header("content-type").is_none());
    }
}
