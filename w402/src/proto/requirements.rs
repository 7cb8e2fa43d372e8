//! Payment terms and the 402 challenge body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::version::X402Version1;

/// The only payment scheme supported.
pub const EXACT_SCHEME: &str = "exact";

/// Message used when a challenge carries no usable `accepts[0]`.
pub const NO_ACCEPTABLE_SCHEME: &str = "No acceptable payment scheme found in response";

/// Message used when `accepts[0]` lacks a mandatory field.
pub const MISSING_REQUIRED_FIELDS: &str = "Missing required fields in x402 payment accept object";

/// What a resource server demands before granting access.
///
/// `asset`, `payTo`, `maxAmountRequired` and `network` are mandatory;
/// [`PaymentRequirements::from_accept`] rejects entries where any of them is
/// absent or empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme, always `"exact"`.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Network identifier, e.g. `"base-sepolia"`.
    pub network: String,
    /// Amount in the token's smallest unit, as a decimal string.
    pub max_amount_required: String,
    /// URL of the paid resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Human-readable description of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// JSON schema of the resource output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Recipient address.
    pub pay_to: String,
    /// How long the server waits for settlement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    /// Token contract address.
    pub asset: String,
    /// Asset metadata, typically the EIP-712 `{name, version}` of the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

fn default_scheme() -> String {
    EXACT_SCHEME.to_owned()
}

/// Why an `accepts` entry cannot be paid.
#[derive(Debug, thiserror::Error)]
pub enum RequirementsError {
    /// The challenge had no `accepts[0]` at all.
    #[error("No acceptable payment scheme found in response")]
    NoAccepts,
    /// `accepts[0]` lacks one or more mandatory fields.
    #[error("Missing required fields in x402 payment accept object: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    /// Scheme other than `"exact"`.
    #[error("unsupported payment scheme: {0}")]
    UnsupportedScheme(String),
    /// A field has the wrong JSON type.
    #[error("malformed payment requirements: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl PaymentRequirements {
    /// Mandatory fields by wire name.
    pub const REQUIRED_FIELDS: [&'static str; 4] =
        ["asset", "payTo", "maxAmountRequired", "network"];

    /// Parses one `accepts` entry, enforcing the mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementsError::MissingFields`] if a mandatory field is
    /// absent, null, or an empty string, and
    /// [`RequirementsError::UnsupportedScheme`] for non-`exact` schemes.
    pub fn from_accept(accept: &Value) -> Result<Self, RequirementsError> {
        let missing: Vec<&'static str> = Self::REQUIRED_FIELDS
            .into_iter()
            .filter(|field| !is_present(accept.get(*field)))
            .collect();
        if !missing.is_empty() {
            return Err(RequirementsError::MissingFields(missing));
        }
        let requirements: Self = serde_json::from_value(accept.clone())?;
        if requirements.scheme != EXACT_SCHEME {
            return Err(RequirementsError::UnsupportedScheme(requirements.scheme));
        }
        Ok(requirements)
    }

    /// Takes `accepts[0]` from a 402 response body.
    ///
    /// Only the first entry is considered; later entries are never tried.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementsError::NoAccepts`] if `accepts` is missing, not
    /// an array, or empty, otherwise whatever [`Self::from_accept`] reports.
    pub fn first_from_challenge(body: &Value) -> Result<Self, RequirementsError> {
        let first = body
            .get("accepts")
            .and_then(Value::as_array)
            .and_then(|accepts| accepts.first())
            .ok_or(RequirementsError::NoAccepts)?;
        Self::from_accept(first)
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// HTTP 402 response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version, always `1`.
    pub x402_version: X402Version1,
    /// Message explaining why payment is needed.
    #[serde(default)]
    pub error: String,
    /// Acceptable payment options. Emitters always produce exactly one.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
}
