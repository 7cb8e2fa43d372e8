//! HTTP constants for x402 v1.

use std::time::Duration;

/// Payment proof header (client to server).
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Settlement confirmation header (server to client).
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// HTTP 402 Payment Required status code.
pub const HTTP_STATUS_PAYMENT_REQUIRED: u16 = 402;

/// Default request timeout of the challenge client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default redirect limit of the challenge client.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Default `error` text of a 402 challenge body.
pub const DEFAULT_CHALLENGE_ERROR: &str = "Payment required to access this resource";

/// Default `mimeType` of challenge requirements.
pub const DEFAULT_MIME_TYPE: &str = "application/json";

/// Default `maxTimeoutSeconds` of challenge requirements.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 60;

/// Default facilitator service URL.
pub const DEFAULT_FACILITATOR_URL: &str = "https://x402.org/facilitator";
