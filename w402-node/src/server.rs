//! Standalone payment gate.
//!
//! Hosts the endpoint/response node pair over axum: every configured gate
//! becomes a route whose inbound request runs through [`EndpointNode`]. An
//! unpaid request gets the [`ResponseNode`] challenge. A paid one is checked
//! with the facilitator (verify, then settle) when one is configured and
//! answered with the gate's body plus the settlement header.

use std::sync::Arc;

use axum::Json;
use axum::body::to_bytes;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, any, get, on};
use axum::Router;
use http::request::Parts;
use http::{Method, StatusCode, header};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use w402::networks::NetworkRegistry;
use w402::node::{Node, StaticContext, WebhookReply};
use w402::proto::FacilitatorRequest;
use w402::{ErrorKind, NodeError};
use w402_http::server::{ChallengeConfig, EmittedResponse, ResponseEmitter};
use w402_http::facilitator::FacilitatorClient;

use crate::config::GateConfig;
use crate::nodes::{EndpointNode, MISSING_PAYMENT_OUTPUT, PAYMENT_PROVIDED_OUTPUT, ResponseNode};

/// Largest request body a gate reads.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Services shared by every gate.
#[derive(Debug, Clone)]
pub struct GateState {
    registry: Arc<NetworkRegistry>,
    facilitator: Option<FacilitatorClient>,
    public_url: Option<String>,
    shutdown: CancellationToken,
}

impl GateState {
    /// State without a facilitator; payments are accepted unverified.
    #[must_use]
    pub fn new(registry: Arc<NetworkRegistry>, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            facilitator: None,
            public_url: None,
            shutdown,
        }
    }

    /// Verifies and settles payments through `facilitator`.
    #[must_use]
    pub fn with_facilitator(mut self, facilitator: Option<FacilitatorClient>) -> Self {
        self.facilitator = facilitator;
        self
    }

    /// Base URL that challenge resources are built on, in place of the
    /// request's `Host` header.
    #[must_use]
    pub fn with_public_url(mut self, url: Option<String>) -> Self {
        self.public_url = url
            .map(|url| url.trim().trim_end_matches('/').to_owned())
            .filter(|url| !url.is_empty());
        self
    }
}

/// Absolute URL of the requested resource.
///
/// Uses `public_url` when set, then the `Host` header (with
/// `X-Forwarded-Proto`, default `http`), and falls back to the bare path.
fn resource_url(parts: &Parts, public_url: Option<&str>) -> String {
    if parts.uri.scheme().is_some() {
        return parts.uri.to_string();
    }
    let path = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    if let Some(base) = public_url {
        return format!("{base}{path}");
    }
    let header_value = |name| {
        parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    match header_value(header::HOST.as_str()) {
        Some(host) => {
            let scheme = header_value("x-forwarded-proto").unwrap_or("http");
            format!("{scheme}://{host}{path}")
        }
        None => path.to_owned(),
    }
}

/// Why a paid request ends up back at the challenge.
enum Outcome {
    Challenge { reason: Option<String> },
    Paid { transaction: String, payer: String, network: String },
}

#[derive(Debug)]
struct Gate {
    config: GateConfig,
    state: GateState,
    emitter: ResponseEmitter,
    responder: ResponseNode,
}

impl Gate {
    fn new(config: GateConfig, state: GateState) -> Self {
        Self {
            emitter: ResponseEmitter::new(Arc::clone(&state.registry)),
            responder: ResponseNode::new(Arc::clone(&state.registry)),
            config,
            state,
        }
    }

    async fn handle(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return error_response(&NodeError::validation(format!(
                    "Failed to read request body: {e}"
                )));
            }
        };
        let resource = resource_url(&parts, self.state.public_url.as_deref());
        let item = EndpointNode::inbound_item(&parts, &bytes);
        match self.respond(item, Some(resource)).await {
            Ok(reply) => {
                tracing::info!(path = %self.config.path, status = reply.status, "gate replied");
                EmittedResponse(reply).into_response()
            }
            Err(err) => {
                tracing::error!(path = %self.config.path, kind = %err.kind, error = %err, "gate failed");
                error_response(&err)
            }
        }
    }

    async fn respond(&self, item: Value, resource: Option<String>) -> Result<WebhookReply, NodeError> {
        let ctx = StaticContext::new(vec![item]).with_cancellation(self.state.shutdown.child_token());
        let mut outputs = EndpointNode.execute(&ctx).await?;
        let unpaid = std::mem::take(&mut outputs[MISSING_PAYMENT_OUTPUT]);
        let paid = std::mem::take(&mut outputs[PAYMENT_PROVIDED_OUTPUT]);

        let (items, parameters) = match paid.first() {
            Some(request) => {
                let payment = request.get("payment").cloned().unwrap_or_default();
                let parameters = match self.settle(payment, resource.clone()).await? {
                    Outcome::Paid {
                        transaction,
                        payer,
                        network,
                    } => self.success_parameters(&transaction, &payer, &network),
                    Outcome::Challenge { reason } => self.challenge_parameters(resource, reason),
                };
                (paid, parameters)
            }
            None => (unpaid, self.challenge_parameters(resource, None)),
        };

        let ctx = StaticContext::new(items)
            .with_parameters(&parameters)
            .with_cancellation(self.state.shutdown.child_token());
        self.responder.execute(&ctx).await?;
        ctx.take_reply()
            .ok_or_else(|| NodeError::configuration("No reply was produced"))
    }

    async fn settle(&self, payment: Value, resource: Option<String>) -> Result<Outcome, NodeError> {
        let Some(facilitator) = &self.state.facilitator else {
            tracing::warn!(path = %self.config.path, "no facilitator configured, accepting payment unverified");
            return Ok(Outcome::Paid {
                transaction: String::new(),
                payer: String::new(),
                network: self.config.network.clone(),
            });
        };
        let requirements = self
            .emitter
            .challenge(&self.challenge_config(resource, None))
            .accepts
            .into_iter()
            .next()
            .ok_or_else(|| NodeError::configuration("Gate has no payment requirements"))?;
        let requirements = serde_json::to_value(requirements)
            .map_err(|e| NodeError::configuration(format!("Failed to encode requirements: {e}")))?;
        let request = FacilitatorRequest::new(payment, requirements);

        let verified = facilitator.verify(&request).await?;
        if !verified.is_valid {
            tracing::info!(reason = ?verified.invalid_reason, "payment rejected by facilitator");
            return Ok(Outcome::Challenge {
                reason: verified.invalid_reason,
            });
        }
        let settled = facilitator.settle(&request).await?;
        if !settled.success {
            tracing::info!(reason = ?settled.error_reason, "settlement failed");
            return Ok(Outcome::Challenge {
                reason: settled.error_reason,
            });
        }
        Ok(Outcome::Paid {
            transaction: settled.transaction,
            payer: settled.payer,
            network: settled.network,
        })
    }

    fn challenge_config(&self, resource: Option<String>, reason: Option<String>) -> ChallengeConfig {
        let defaults = ChallengeConfig::default();
        ChallengeConfig {
            network: self.config.network.clone(),
            asset: self.config.asset.clone(),
            pay_to: self.config.pay_to.clone(),
            amount_required: self.config.amount_required.clone(),
            resource,
            description: self.config.description.clone(),
            error: reason.unwrap_or(defaults.error),
            mime_type: self.config.mime_type.clone(),
            max_timeout_seconds: self.config.max_timeout_seconds,
            extra: defaults.extra,
        }
    }

    fn challenge_parameters(&self, resource: Option<String>, reason: Option<String>) -> Value {
        let config = self.challenge_config(resource, reason);
        json!({
            "responseMode": "paymentRequired",
            "network": config.network,
            "asset": config.asset,
            "payTo": config.pay_to,
            "amountRequired": config.amount_required,
            "resource": config.resource,
            "description": config.description,
            "paymentRequiredMessage": config.error,
            "mimeType": config.mime_type,
            "maxTimeoutSeconds": config.max_timeout_seconds,
            "extra": config.extra,
        })
    }

    fn success_parameters(&self, transaction: &str, payer: &str, network: &str) -> Value {
        json!({
            "responseMode": "success",
            "responseData": "json",
            "responseBody": self.config.response,
            "transactionHash": transaction,
            "payerAddress": payer,
            "network": network,
        })
    }
}

fn error_response(err: &NodeError) -> Response {
    let status = match err.kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Network | ErrorKind::ProtocolViolation => StatusCode::BAD_GATEWAY,
        ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": err.message}))).into_response()
}

/// Router serving every gate plus `GET /health`.
///
/// # Errors
///
/// Returns a configuration error if a gate names an unsupported method.
pub fn gate_router(gates: Vec<GateConfig>, state: &GateState) -> Result<Router, NodeError> {
    let mut router = Router::new().route("/health", get(health));
    for config in gates {
        let filter = match config.method.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(method) => {
                let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| NodeError::configuration(format!("Invalid method {method:?}")))?;
                Some(MethodFilter::try_from(method.clone()).map_err(|_| {
                    NodeError::configuration(format!("Unsupported method {method}"))
                })?)
            }
        };
        let path = config.path.clone();
        let gate = Arc::new(Gate::new(config, state.clone()));
        let handler = move |request: Request| {
            let gate = Arc::clone(&gate);
            async move { gate.handle(request).await }
        };
        tracing::info!(path = %path, method = ?filter, "registered gate");
        router = match filter {
            Some(filter) => router.route(&path, on(filter, handler)),
            None => router.route(&path, any(handler)),
        };
    }
    Ok(router)
}

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
