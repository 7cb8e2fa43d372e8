//! Payment-challenge HTTP client.
//!
//! [`PaymentChallengeClient`] issues a request and, when the server answers
//! `402 Payment Required`, takes the first entry of the challenge's
//! `accepts`, has a [`PaymentSigner`] produce a payment, and reissues the
//! identical request once with an `X-PAYMENT` header. The retry counts as
//! settled only when it returns `200` with a decodable `X-PAYMENT-RESPONSE`.
//!
//! There is exactly one retry. A second 402 is a hard failure, never a
//! reason to pay again.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use reqwest::Method;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use url::Url;
use w402::proto::{PaymentPayload, PaymentRequirements, RequirementsError, SettlementConfirmation};
use w402::{ErrorKind, NodeError};

use crate::constants::{
    DEFAULT_MAX_REDIRECTS, DEFAULT_REQUEST_TIMEOUT, HTTP_STATUS_PAYMENT_REQUIRED, X_PAYMENT_HEADER,
    X_PAYMENT_RESPONSE_HEADER,
};
use crate::error::HeaderError;
use crate::headers::{decode_payment_response, encode_x_payment};

/// Produces a signed payment for a set of requirements.
#[async_trait]
pub trait PaymentSigner: Send + Sync {
    /// Signs a payment satisfying `requirements`.
    ///
    /// # Errors
    ///
    /// Returns a [`NodeError`] classified by its cause.
    async fn sign_payment(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, NodeError>;
}

/// Failure of a challenge exchange.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request could not be built from its parameters.
    #[error("{0}")]
    InvalidRequest(String),
    /// No response within the configured timeout.
    #[error("Request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
    /// The execution was cancelled.
    #[error("Request cancelled")]
    Cancelled,
    /// Connection or protocol failure below HTTP semantics.
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// The 402 body had no usable `accepts[0]`.
    #[error(transparent)]
    NoAcceptablePaymentScheme(#[from] RequirementsError),
    /// Building the payment failed.
    #[error(transparent)]
    Payment(NodeError),
    /// The paid retry was answered with 402 again.
    #[error("Payment rejected by server: {0}")]
    PaymentRejected(String),
    /// The paid retry was answered with a status other than 200 or 402.
    #[error("Request with payment failed with status {status}: {message}")]
    RetryFailed {
        /// Status of the retry.
        status: u16,
        /// Response text.
        message: String,
    },
    /// The paid retry returned 200 without `X-PAYMENT-RESPONSE`.
    #[error("No payment response header found")]
    MissingSettlement,
    /// Header encoding or decoding failed.
    #[error(transparent)]
    Header(#[from] HeaderError),
}

impl ClientError {
    /// Error class of this failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::Validation,
            Self::Timeout(_) | Self::Cancelled | Self::Transport(_) | Self::RetryFailed { .. } => {
                ErrorKind::Network
            }
            Self::NoAcceptablePaymentScheme(_)
            | Self::PaymentRejected(_)
            | Self::MissingSettlement
            | Self::Header(HeaderError::Decode { .. } | HeaderError::NotAscii(_)) => {
                ErrorKind::ProtocolViolation
            }
            Self::Header(HeaderError::Serialize(_)) => ErrorKind::Configuration,
            Self::Payment(err) => err.kind,
        }
    }
}

impl From<ClientError> for NodeError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Payment(inner) => inner,
            other => Self::new(other.kind(), other.to_string()),
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Per-attempt timeout, covering the response body.
    pub timeout: Duration,
    /// Follow 3xx redirects.
    pub follow_redirects: bool,
    /// Redirect limit when following.
    pub max_redirects: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// The request to issue, identical on the first attempt and the retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,
    /// Request headers. `Content-Type: application/json` unless overridden.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
}

impl RequestSpec {
    /// Request with no query, headers or body.
    #[must_use]
    pub const fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Parses `method` and `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] if either does not parse.
    pub fn parse(method: &str, url: &str) -> Result<Self, ClientError> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| ClientError::InvalidRequest(format!("Invalid HTTP method: {method}")))?;
        let url = Url::parse(url.trim())
            .map_err(|e| ClientError::InvalidRequest(format!("Invalid URL {url:?}: {e}")))?;
        Ok(Self::new(method, url))
    }

    /// Whether the method carries a body.
    #[must_use]
    pub fn can_have_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets a header, replacing an earlier one of the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Parses `raw` as the JSON body. Blank text leaves the body unset, as
    /// does a method without a body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] if `raw` is not valid JSON.
    pub fn with_body_text(self, raw: &str) -> Result<Self, ClientError> {
        if !self.can_have_body() || raw.trim().is_empty() {
            return Ok(self);
        }
        let body = serde_json::from_str(raw)
            .map_err(|e| ClientError::InvalidRequest(format!("Invalid JSON body: {e}")))?;
        Ok(self.with_body(body))
    }

    /// URL with the query parameters applied.
    #[must_use]
    pub fn full_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }
        url
    }

    fn header_map(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|_| ClientError::InvalidRequest(format!("Invalid header name: {name}")))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                ClientError::InvalidRequest(format!("Invalid value for header {name}"))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Whether the client pays only when challenged or pays up front.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentMode {
    /// Send unpaid; pay once if challenged.
    Auto,
    /// Pay for the given requirements on the first attempt and skip
    /// challenge detection. The single response is judged like a retry.
    Manual(PaymentRequirements),
}

/// The response as surfaced to the workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseData {
    /// Status code.
    pub status: u16,
    /// Canonical reason phrase.
    pub status_text: String,
    /// Headers by lower-case name; repeated headers joined with `", "`.
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when the content type says so, text otherwise.
    pub data: Value,
    /// Request URL, including query.
    pub url: String,
    /// Request method.
    pub method: String,
}

/// Terminal state of a successful exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeOutcome {
    /// The first response was not a 402. Passed through unchanged.
    Direct(ResponseData),
    /// The paid request returned 200 with a settlement confirmation.
    Settled {
        /// The paid response.
        response: ResponseData,
        /// Decoded `X-PAYMENT-RESPONSE`.
        settlement: SettlementConfirmation,
    },
}

impl ChallengeOutcome {
    /// The final response.
    #[must_use]
    pub const fn response(&self) -> &ResponseData {
        match self {
            Self::Direct(response) | Self::Settled { response, .. } => response,
        }
    }

    /// The settlement confirmation, if paid.
    #[must_use]
    pub const fn settlement(&self) -> Option<&SettlementConfirmation> {
        match self {
            Self::Direct(_) => None,
            Self::Settled { settlement, .. } => Some(settlement),
        }
    }

    /// Output item `{status, statusText, headers, data, url, method, paymentResponse}`.
    #[must_use]
    pub fn to_item(&self) -> Value {
        let response = self.response();
        json!({
            "status": response.status,
            "statusText": response.status_text,
            "headers": response.headers,
            "data": response.data,
            "url": response.url,
            "method": response.method,
            "paymentResponse": self.settlement(),
        })
    }
}

struct Fetched {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Fetched {
    fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn into_data(self, spec: &RequestSpec) -> ResponseData {
        let is_json = self
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        let data = if is_json {
            serde_json::from_slice(&self.body).unwrap_or_else(
                |e| json!({"error": format!("Failed to parse JSON response: {e}")}),
            )
        } else {
            Value::String(self.body_text())
        };
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &self.headers {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_owned())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        ResponseData {
            status: self.status.as_u16(),
            status_text: self.status.canonical_reason().unwrap_or_default().to_owned(),
            headers,
            data,
            url: spec.full_url().to_string(),
            method: spec.method.to_string(),
        }
    }
}

/// Client that answers 402 challenges with a signed payment.
#[derive(Debug)]
pub struct PaymentChallengeClient<S> {
    signer: S,
    http: reqwest::Client,
    options: RequestOptions,
}

impl<S: PaymentSigner> PaymentChallengeClient<S> {
    /// Client with its own connection pool configured from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be built.
    pub fn new(signer: S, options: RequestOptions) -> Result<Self, ClientError> {
        let redirect = if options.follow_redirects {
            reqwest::redirect::Policy::limited(options.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };
        let http = reqwest::Client::builder()
            .redirect(redirect)
            .build()
            .map_err(ClientError::Transport)?;
        Ok(Self {
            signer,
            http,
            options,
        })
    }

    /// Transport settings.
    #[must_use]
    pub const fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Runs the exchange for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for an invalid request, a transport failure,
    /// timeout or cancellation, an unusable challenge, a signing failure, or
    /// a paid request that did not settle.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        method = %spec.method,
        url = %spec.url,
        manual = matches!(mode, PaymentMode::Manual(_))
    )))]
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        mode: &PaymentMode,
        cancel: &CancellationToken,
    ) -> Result<ChallengeOutcome, ClientError> {
        let headers = spec.header_map()?;
        let requirements = match mode {
            PaymentMode::Manual(requirements) => requirements.clone(),
            PaymentMode::Auto => {
                let first = self.fetch(spec, headers.clone(), cancel).await?;
                if first.status.as_u16() != HTTP_STATUS_PAYMENT_REQUIRED {
                    #[cfg(feature = "telemetry")]
                    tracing::trace!(status = %first.status, "no payment required");
                    return Ok(ChallengeOutcome::Direct(first.into_data(spec)));
                }
                #[cfg(feature = "telemetry")]
                tracing::info!("received 402 Payment Required, processing payment");
                let body = first.body_json().unwrap_or(Value::Null);
                PaymentRequirements::first_from_challenge(&body)?
            }
        };

        let payment = self.payment_header(&requirements, cancel).await?;
        let mut paid_headers = headers;
        paid_headers.insert(X_PAYMENT_HEADER, payment);
        let paid = self.fetch(spec, paid_headers, cancel).await?;
        Self::settle(paid, spec)
    }

    async fn payment_header(
        &self,
        requirements: &PaymentRequirements,
        cancel: &CancellationToken,
    ) -> Result<HeaderValue, ClientError> {
        let payload = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            signed = self.signer.sign_payment(requirements) => signed.map_err(ClientError::Payment)?,
        };
        let encoded = encode_x_payment(&payload)?;
        HeaderValue::from_str(&encoded).map_err(|_| HeaderError::NotAscii(X_PAYMENT_HEADER).into())
    }

    fn settle(paid: Fetched, spec: &RequestSpec) -> Result<ChallengeOutcome, ClientError> {
        if paid.status.as_u16() == HTTP_STATUS_PAYMENT_REQUIRED {
            let reason = paid
                .body_json()
                .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_owned))
                .filter(|reason| !reason.is_empty())
                .unwrap_or_else(|| "payment was not accepted".to_owned());
            return Err(ClientError::PaymentRejected(reason));
        }
        if paid.status != StatusCode::OK {
            return Err(ClientError::RetryFailed {
                status: paid.status.as_u16(),
                message: paid.body_text(),
            });
        }
        let header = paid
            .headers
            .get(X_PAYMENT_RESPONSE_HEADER)
            .ok_or(ClientError::MissingSettlement)?
            .to_str()
            .map_err(|_| HeaderError::NotAscii(X_PAYMENT_RESPONSE_HEADER))?;
        let settlement = decode_payment_response(header)?;
        #[cfg(feature = "telemetry")]
        tracing::info!(transaction = %settlement.transaction, network = %settlement.network, "payment settled");
        Ok(ChallengeOutcome::Settled {
            response: paid.into_data(spec),
            settlement,
        })
    }

    async fn fetch(
        &self,
        spec: &RequestSpec,
        headers: HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<Fetched, ClientError> {
        let mut request = self
            .http
            .request(spec.method.clone(), spec.full_url())
            .headers(headers);
        if spec.can_have_body()
            && let Some(body) = &spec.body
        {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| ClientError::InvalidRequest(format!("Invalid JSON body: {e}")))?;
            request = request.body(bytes);
        }
        self.guarded(cancel, async move {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?.to_vec();
            Ok(Fetched {
                status,
                headers,
                body,
            })
        })
        .await
    }

    async fn guarded<T, F>(&self, cancel: &CancellationToken, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, reqwest::Error>>,
    {
        let timeout = self.options.timeout;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ClientError::Cancelled),
            result = tokio::time::timeout(timeout, fut) => match result {
                Err(_) => Err(ClientError::Timeout(timeout)),
                Ok(Err(e)) if e.is_timeout() => Err(ClientError::Timeout(timeout)),
                Ok(Err(e)) => Err(ClientError::Transport(e)),
                Ok(Ok(value)) => Ok(value),
            },
        }
    }
}
