//! Protocol version marker.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Version marker fixed at compile time.
///
/// Serializes as a bare integer and refuses any other number when
/// deserializing, so a v2 body never passes for a v1 one.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version<const N: u8>;

/// The only protocol version these nodes speak.
pub type X402Version1 = Version<1>;

/// Value of [`X402Version1`].
pub const V1: X402Version1 = Version;

impl<const N: u8> Version<N> {
    /// Numeric value.
    pub const VALUE: u8 = N;
}

impl<const N: u8> From<Version<N>> for u8 {
    fn from(_: Version<N>) -> Self {
        N
    }
}

impl<const N: u8> std::fmt::Display for Version<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{N}")
    }
}

impl<const N: u8> Serialize for Version<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(N)
    }
}

impl<'de, const N: u8> Deserialize<'de> for Version<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = u8::deserialize(deserializer)?;
        if v == N {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported x402Version {v}, expected {N}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_rejects_mismatch() {
        assert_eq!(serde_json::to_string(&V1).unwrap(), "1");
        assert!(serde_json::from_str::<X402Version1>("1").is_ok());
        let err = serde_json::from_str::<X402Version1>("2").unwrap_err();
        assert!(err.to_string().contains("unsupported x402Version 2"));
    }
}
