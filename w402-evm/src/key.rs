//! Private key normalization.
//!
//! Keys arrive from credentials and environment variables in whatever shape
//! the operator pasted them. They are trimmed, given a `0x` prefix when it is
//! missing, and must then be exactly 32 bytes of hex.

use std::str::FromStr;
use std::sync::LazyLock;

use alloy_signer_local::PrivateKeySigner;
use regex::Regex;

use crate::signer::SignerError;

static PRIVATE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("valid private key regex"));

/// Trims `raw`, injects a `0x` prefix, and checks the 64-hex-digit format.
///
/// # Errors
///
/// Returns [`SignerError::InvalidKeyFormat`] if the normalized key is not
/// `0x` followed by 64 hex characters.
pub fn normalize_private_key(raw: &str) -> Result<String, SignerError> {
    let trimmed = raw.trim();
    let key = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        format!("0x{}", &trimmed[2..])
    } else {
        format!("0x{trimmed}")
    };
    if PRIVATE_KEY_RE.is_match(&key) {
        Ok(key)
    } else {
        Err(SignerError::InvalidKeyFormat)
    }
}

/// Normalizes `raw` and builds a local signer from it.
///
/// # Errors
///
/// Returns [`SignerError::InvalidKeyFormat`] if the key is malformed or is
/// not a valid secp256k1 scalar.
pub fn parse_private_key(raw: &str) -> Result<PrivateKeySigner, SignerError> {
    let key = normalize_private_key(raw)?;
    PrivateKeySigner::from_str(&key).map_err(|_| SignerError::InvalidKeyFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_normalizes_prefix_and_whitespace() {
        let expected = format!("0x{KEY}");
        assert_eq!(normalize_private_key(KEY).unwrap(), expected);
        assert_eq!(normalize_private_key(&format!("  0x{KEY}\n")).unwrap(), expected);
        assert_eq!(normalize_private_key(&format!("0X{KEY}")).unwrap(), expected);
    }

    #[test]
    fn test_rejects_bad_formats() {
        let bad = vec![
            String::new(),
            "0x".to_owned(),
            KEY[..63].to_owned(),
            format!("{KEY}00"),
            KEY.replace('a', "g"),
        ];
        for raw in &bad {
            assert!(
                matches!(normalize_private_key(raw), Err(SignerError::InvalidKeyFormat)),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn test_parse_private_key_derives_address() {
        let signer = parse_private_key(KEY).unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        let zero = "0".repeat(64);
        assert!(matches!(parse_private_key(&zero), Err(SignerError::InvalidKeyFormat)));
    }
}
