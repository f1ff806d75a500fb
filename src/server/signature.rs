use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header GitHub puts the body signature in.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,

    #[error("malformed signature header")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,
}

/// Check a `sha256=<hex>` signature over the raw request body.
/// The digest comparison is constant-time.
pub fn verify(secret: &str, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let signature_hex = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::Malformed)?;
    let expected = hex::decode(signature_hex).map_err(|_| SignatureError::Malformed)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "It's a Secret to Everybody";

    #[test]
    fn test_known_github_vector() {
        // Example from GitHub's webhook validation docs.
        let header = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert_eq!(verify(SECRET, b"Hello, World!", Some(header)), Ok(()));
    }

    #[test]
    fn test_sign_then_verify() {
        let payload = br#"{"action":"opened"}"#;
        let header = sign("s3cret", payload);
        assert!(verify("s3cret", payload, Some(&header)).is_ok());
        assert_eq!(
            verify("other", payload, Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_any_altered_byte_is_rejected() {
        let payload = b"{\"action\":\"edited\"}";
        let header = sign("s3cret", payload);
        for i in 0..payload.len() {
            let mut tampered = payload.to_vec();
            tampered[i] ^= 0x01;
            assert_eq!(
                verify("s3cret", &tampered, Some(&header)),
                Err(SignatureError::Mismatch)
            );
        }
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        assert_eq!(verify("s", b"x", None), Err(SignatureError::Missing));
        assert_eq!(verify("s", b"x", Some("sha1=abcd")), Err(SignatureError::Malformed));
        assert_eq!(verify("s", b"x", Some("sha256=zz")), Err(SignatureError::Malformed));
    }
}
