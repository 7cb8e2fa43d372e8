//! HTTP client for a remote x402 facilitator.
//!
//! [`FacilitatorClient`] talks to the `/verify`, `/settle` and `/supported`
//! endpoints. Payloads and requirements are forwarded as given; the
//! facilitator decides whether they are acceptable.
//!
//! ## Error Handling
//!
//! [`FacilitatorError`] separates URL construction, transport failures,
//! undecodable bodies, and non-200 answers.

use std::time::Duration;

use http::{HeaderMap, HeaderValue, StatusCode};
use reqwest::Client;
use url::Url;
use w402::NodeError;
use w402::proto::{FacilitatorRequest, SettleResponse, SupportedResponse, VerifyResponse};

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// The API key cannot be sent as a header value.
    #[error("Invalid facilitator API key")]
    InvalidApiKey,
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl From<FacilitatorError> for NodeError {
    fn from(err: FacilitatorError) -> Self {
        match err {
            FacilitatorError::UrlParse { .. } | FacilitatorError::InvalidApiKey => {
                Self::configuration(err.to_string())
            }
            FacilitatorError::JsonDeserialization { .. } => Self::protocol(err.to_string()),
            FacilitatorError::Http { .. }
            | FacilitatorError::HttpStatus { .. }
            | FacilitatorError::ResponseBodyRead { .. } => Self::network(err.to_string()),
        }
    }
}

/// A client for communicating with a remote x402 facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl FacilitatorClient {
    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL.
    #[must_use]
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the computed `./settle` URL.
    #[must_use]
    pub const fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Returns the computed `./supported` URL.
    #[must_use]
    pub const fn supported_url(&self) -> &Url {
        &self.supported_url
    }

    /// Returns any custom headers configured on the client.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Constructs a client whose endpoints are relative to `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError::UrlParse`] if URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorError> {
        let join = |path: &str, context: &'static str| {
            base_url
                .join(path)
                .map_err(|source| FacilitatorError::UrlParse { context, source })
        };
        Ok(Self {
            verify_url: join("./verify", "Failed to construct ./verify URL")?,
            settle_url: join("./settle", "Failed to construct ./settle URL")?,
            supported_url: join("./supported", "Failed to construct ./supported URL")?,
            client: Client::new(),
            base_url,
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sends `Authorization: Bearer <api_key>` with every request. A blank
    /// key is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError::InvalidApiKey`] if the key is not a valid
    /// header value.
    pub fn with_bearer(mut self, api_key: &str) -> Result<Self, FacilitatorError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Ok(self);
        }
        let mut value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| FacilitatorError::InvalidApiKey)?;
        value.set_sensitive(true);
        self.headers.insert(http::header::AUTHORIZATION, value);
        Ok(self)
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends a `POST /verify` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError`] if the HTTP request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "w402.facilitator_client.verify", skip_all, err)
    )]
    pub async fn verify(
        &self,
        request: &FacilitatorRequest,
    ) -> Result<VerifyResponse, FacilitatorError> {
        self.send(self.client.post(self.verify_url.clone()).json(request), "POST /verify")
            .await
    }

    /// Sends a `POST /settle` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError`] if the HTTP request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "w402.facilitator_client.settle", skip_all, err)
    )]
    pub async fn settle(
        &self,
        request: &FacilitatorRequest,
    ) -> Result<SettleResponse, FacilitatorError> {
        self.send(self.client.post(self.settle_url.clone()).json(request), "POST /settle")
            .await
    }

    /// Sends a `GET /supported` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorError`] if the HTTP request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "w402.facilitator_client.supported", skip_all, err)
    )]
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorError> {
        self.send(self.client.get(self.supported_url.clone()), "GET /supported")
            .await
    }

    async fn send<R>(
        &self,
        request: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<R, FacilitatorError>
    where
        R: serde::de::DeserializeOwned,
    {
        let mut request = request.header(http::header::ACCEPT, "application/json");
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|source| FacilitatorError::Http { context, source })?;

        if response.status() == StatusCode::OK {
            return response
                .json::<R>()
                .await
                .map_err(|source| FacilitatorError::JsonDeserialization { context, source });
        }
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| FacilitatorError::ResponseBodyRead { context, source })?;
        #[cfg(feature = "telemetry")]
        tracing::error!(%status, context, "request to facilitator failed");
        Err(FacilitatorError::HttpStatus {
            context,
            status,
            body,
        })
    }
}

/// Parses a base URL, normalizing it to exactly one trailing slash.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim().trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|source| FacilitatorError::UrlParse {
            context: "Failed to parse base url",
            source,
        })?;
        Self::try_new(url)
    }
}
