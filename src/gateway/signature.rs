//! Webhook signature verification.
//!
//! Deliveries carry a header of the form `t=<unix seconds>,v1=<hex>`, where
//! the signature is HMAC-SHA256 over `"<t>.<raw body>"`. Several `v1` values
//! may be present during secret rotation; any match is accepted.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Name of the HTTP header carrying the signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, Error, PartialEq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature header has no timestamp")]
    MissingTimestamp,
    #[error("signature header has no v1 signature")]
    MissingSignature,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("signature does not match payload")]
    Mismatch,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verify `payload` against `header` at the current time.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let (key, value) = part.trim().split_once('=').ok_or(SignatureError::Malformed)?;
            match key {
                "t" => timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
        if signatures.is_empty() {
            return Err(SignatureError::MissingSignature);
        }
        if now.abs_diff(timestamp) > self.tolerance.as_secs() {
            return Err(SignatureError::Expired);
        }

        let matched = signatures.iter().any(|signature| {
            hex::decode(signature).is_ok_and(|expected| {
                self.mac(timestamp, payload)
                    .is_some_and(|mac| mac.verify_slice(&expected).is_ok())
            })
        });
        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Produce a header for `payload` signed at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let signature = self
            .mac(timestamp, payload)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("t={timestamp},v1={signature}")
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Some(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test", Duration::from_secs(300))
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = br#"{"type":"charge.succeeded"}"#;
        let header = verifier().sign(payload, NOW);
        assert_eq!(verifier().verify_at(payload, &header, NOW + 10), Ok(()));
    }

    #[test]
    fn modified_payload_is_rejected() {
        let header = verifier().sign(br#"{"amount":1}"#, NOW);
        assert_eq!(
            verifier().verify_at(br#"{"amount":2}"#, &header, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = b"{}";
        let header = WebhookVerifier::new("other", Duration::from_secs(300)).sign(payload, NOW);
        assert_eq!(
            verifier().verify_at(payload, &header, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn old_timestamp_is_rejected() {
        let payload = b"{}";
        let header = verifier().sign(payload, NOW - 600);
        assert_eq!(
            verifier().verify_at(payload, &header, NOW),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn any_rotated_signature_matches() {
        let payload = b"{}";
        let signed = verifier().sign(payload, NOW);
        let good = signed.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v1={good}");
        assert_eq!(verifier().verify_at(payload, &header, NOW), Ok(()));
    }

    #[test]
    fn malformed_headers() {
        let v = verifier();
        assert_eq!(v.verify_at(b"{}", "garbage", NOW), Err(SignatureError::Malformed));
        assert_eq!(v.verify_at(b"{}", "", NOW), Err(SignatureError::Malformed));
        assert_eq!(
            v.verify_at(b"{}", "v1=abc", NOW),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            v.verify_at(b"{}", "t=1700000000", NOW),
            Err(SignatureError::MissingSignature)
        );
        assert_eq!(
            v.verify_at(b"{}", "t=soon,v1=abc", NOW),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn non_hex_signature_is_mismatch() {
        let header = format!("t={NOW},v1=not-hex");
        assert_eq!(
            verifier().verify_at(b"{}", &header, NOW),
            Err(SignatureError::Mismatch)
        );
    }
}
