//! Error types for the header codecs.

use w402::NodeError;
use w402::proto::DecodeError;

/// Failure to encode or decode an x402 header.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Base64 or JSON decoding failed.
    #[error("Failed to decode {header} header: {source}")]
    Decode {
        /// Header name.
        header: &'static str,
        /// Underlying failure.
        #[source]
        source: DecodeError,
    },
    /// The header value is not valid ASCII.
    #[error("{0} header is not valid ASCII")]
    NotAscii(&'static str),
}

impl From<HeaderError> for NodeError {
    fn from(err: HeaderError) -> Self {
        match err {
            HeaderError::Serialize(_) => Self::configuration(err.to_string()),
            HeaderError::Decode { .. } | HeaderError::NotAscii(_) => Self::protocol(err.to_string()),
        }
    }
}
