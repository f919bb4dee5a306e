//! Request fingerprinting.

use sha2::{Digest, Sha256};

use idem_core::RequestFingerprint;

use crate::options::FingerprintKind;

/// Turns a request body into a fingerprint.
pub trait Fingerprinter: Send + Sync {
    /// Whether the body must be buffered before [`Fingerprinter::fingerprint`].
    fn reads_body(&self) -> bool {
        true
    }

    fn fingerprint(&self, body: &[u8]) -> RequestFingerprint;
}

/// Lowercase hex SHA-256 of the raw request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodySha256;

impl Fingerprinter for BodySha256 {
    fn fingerprint(&self, body: &[u8]) -> RequestFingerprint {
        RequestFingerprint::new(hex::encode(Sha256::digest(body)))
    }
}

/// Treats every payload as the same request; the body is left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantFingerprint;

impl Fingerprinter for ConstantFingerprint {
    fn reads_body(&self) -> bool {
        false
    }

    fn fingerprint(&self, _body: &[u8]) -> RequestFingerprint {
        RequestFingerprint::constant()
    }
}

/// The fingerprinter selected by configuration.
#[must_use]
pub fn fingerprinter_for(kind: FingerprintKind) -> std::sync::Arc<dyn Fingerprinter> {
    match kind {
        FingerprintKind::BodySha256 => std::sync::Arc::new(BodySha256),
        FingerprintKind::Constant => std::sync::Arc::new(ConstantFingerprint),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_of_empty_body() {
        assert_eq!(
            BodySha256.fingerprint(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_distinguishes_payloads() {
        let a = BodySha256.fingerprint(br#"{"amount":10}"#);
        let b = BodySha256.fingerprint(br#"{"amount":11}"#);
        assert_ne!(a, b);
        assert_eq!(a, BodySha256.fingerprint(br#"{"amount":10}"#));
    }

    #[test]
    fn test_constant_ignores_payload() {
        assert!(!ConstantFingerprint.reads_body());
        assert_eq!(
            ConstantFingerprint.fingerprint(b"one"),
            ConstantFingerprint.fingerprint(b"two")
        );
    }

    #[test]
    fn test_fingerprinter_for_kind() {
        assert!(fingerprinter_for(FingerprintKind::BodySha256).reads_body());
        assert!(!fingerprinter_for(FingerprintKind::Constant).reads_body());
    }
}
