use serde_json::Value;

use crate::constants::X_PAYMENT_HEADER;
use crate::headers::decode_x_payment;

/// Fields a decoded `X-PAYMENT` object must carry to count as a payment.
pub const REQUIRED_PAYMENT_FIELDS: [&str; 4] = ["x402Version", "scheme", "network", "payload"];

/// Which branch an inbound request takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A well-formed payment header was found. Carries the decoded object.
    PaymentProvided(Value),
    /// No header, or one that does not decode to a payment.
    MissingPayment,
}

impl Classification {
    /// Decoded payment, if any.
    #[must_use]
    pub const fn payment(&self) -> Option<&Value> {
        match self {
            Self::PaymentProvided(payment) => Some(payment),
            Self::MissingPayment => None,
        }
    }

    /// Output index: `0` for payment provided, `1` for missing payment.
    #[must_use]
    pub const fn output(&self) -> usize {
        match self {
            Self::PaymentProvided(_) => 0,
            Self::MissingPayment => 1,
        }
    }

    /// Places `item` on this branch and an empty list on the other.
    #[must_use]
    pub fn route(&self, item: Value) -> Vec<Vec<Value>> {
        let mut outputs = vec![Vec::new(), Vec::new()];
        outputs[self.output()].push(item);
        outputs
    }
}

/// Decodes a header value and checks it carries every
/// [`REQUIRED_PAYMENT_FIELDS`] entry. Any failure yields `None`.
#[must_use]
pub fn parse_payment_header(value: &str) -> Option<Value> {
    let decoded = decode_x_payment(value).ok()?;
    let object = decoded.as_object()?;
    REQUIRED_PAYMENT_FIELDS
        .iter()
        .all(|field| object.get(*field).is_some_and(|v| !v.is_null()))
        .then_some(decoded)
}

fn from_value(value: Option<&str>) -> Classification {
    let classification = value
        .and_then(parse_payment_header)
        .map_or(Classification::MissingPayment, Classification::PaymentProvided);
    #[cfg(feature = "telemetry")]
    tracing::debug!(
        header_present = value.is_some(),
        paid = classification.payment().is_some(),
        "classified inbound request"
    );
    classification
}

/// Classifies a request by its HTTP headers. Never fails.
#[must_use]
pub fn classify(headers: &http::HeaderMap) -> Classification {
    from_value(headers.get(X_PAYMENT_HEADER).and_then(|v| v.to_str().ok()))
}

/// Classifies a request by a JSON object of headers, as a webhook host
/// hands them over. Names compare case-insensitively. Never fails.
#[must_use]
pub fn classify_json(headers: &Value) -> Classification {
    let value = headers.as_object().and_then(|map| {
        map.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(X_PAYMENT_HEADER))
            .and_then(|(_, value)| value.as_str())
    });
    from_value(value)
}
