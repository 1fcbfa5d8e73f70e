//! Webhook signature verification
//!
//! The provider signs `"{timestamp}.{raw_body}"` with HMAC-SHA256 using the
//! endpoint's signing secret and sends the result in the signature header:
//!
//! ```text
//! Stripe-Signature: t=1700000000,v1=5257a869...,v1=9f1c0e...,v0=...
//! ```
//!
//! Several `v1` entries may be present while a secret is being rolled; the
//! payload is accepted if any of them matches. Other schemes are ignored.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use super::event::Event;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the provider signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Default replay window (5 minutes)
pub const DEFAULT_TOLERANCE_SECONDS: u64 = 300;

const SIGNATURE_SCHEME: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("Webhook signature does not match")]
    BadSignature,

    #[error("Webhook timestamp outside tolerance window")]
    StaleTimestamp,

    #[error("Webhook payload is not a valid event")]
    MalformedPayload,
}

impl VerificationError {
    /// Machine-readable reason returned to the provider
    pub fn code(&self) -> &'static str {
        match self {
            VerificationError::BadSignature => "bad_signature",
            VerificationError::StaleTimestamp => "stale_timestamp",
            VerificationError::MalformedPayload => "malformed_payload",
        }
    }
}

/// HMAC-SHA256 verifier for provider webhooks
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance_seconds: u64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance_seconds: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_seconds,
        }
    }

    /// Verify a delivery against the current wall clock and parse the event
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<Event, VerificationError> {
        self.verify_at(
            payload,
            signature_header,
            OffsetDateTime::now_utc().unix_timestamp(),
        )
    }

    /// Verify a delivery as of `now` (unix seconds) and parse the event
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<Event, VerificationError> {
        let (timestamp, signatures) = parse_signature_header(signature_header).ok_or_else(|| {
            tracing::warn!("Malformed webhook signature header");
            VerificationError::BadSignature
        })?;

        let expected = self.compute_signature(timestamp, payload);
        let matched = signatures
            .iter()
            .any(|candidate| bool::from(candidate.as_slice().ct_eq(&expected)));

        if !matched {
            tracing::warn!(
                timestamp,
                candidates = signatures.len(),
                "Webhook signature mismatch"
            );
            return Err(VerificationError::BadSignature);
        }

        let skew = now.abs_diff(timestamp);
        if skew > self.tolerance_seconds {
            tracing::warn!(
                timestamp,
                now,
                skew,
                tolerance = self.tolerance_seconds,
                "Webhook timestamp outside tolerance"
            );
            return Err(VerificationError::StaleTimestamp);
        }

        Event::from_slice(payload).ok_or(VerificationError::MalformedPayload)
    }

    /// Build a signature header value for `payload` at `timestamp`
    ///
    /// This is what the provider sends; useful for local tooling and tests.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        format!(
            "t={},{}={}",
            timestamp,
            SIGNATURE_SCHEME,
            hex::encode(self.compute_signature(timestamp, payload))
        )
    }

    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length, so new_from_slice cannot fail here
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Split `t=...,v1=...` into the timestamp and the decoded `v1` signatures
fn parse_signature_header(header: &str) -> Option<(i64, Vec<Vec<u8>>)> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            SIGNATURE_SCHEME => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp?;
    if signatures.is_empty() {
        return None;
    }
    Some((timestamp, signatures))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn body() -> Vec<u8> {
        br#"{"id":"evt_1","type":"invoice.payment_succeeded","created":1700000000,"livemode":false,"data":{"object":{"amount":1000}}}"#.to_vec()
    }

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(SECRET, DEFAULT_TOLERANCE_SECONDS)
    }

    #[test]
    fn test_accepts_correctly_signed_payload() {
        let v = verifier();
        let header = v.sign(&body(), NOW);

        let event = v.verify_at(&body(), &header, NOW + 10).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.payload["object"]["amount"], 1000);
    }

    #[test]
    fn test_signed_content_is_timestamp_dot_body() {
        // Signed content is "{t}.{body}"
        let v = verifier();
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(b"1700000000.{}");
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(v.sign(b"{}", NOW), format!("t=1700000000,v1={}", expected));
    }

    #[test]
    fn test_rejects_any_altered_body_byte() {
        let v = verifier();
        let original = body();
        let header = v.sign(&original, NOW);

        for i in 0..original.len() {
            let mut tampered = original.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                v.verify_at(&tampered, &header, NOW),
                Err(VerificationError::BadSignature),
                "byte {} altered but payload accepted",
                i
            );
        }
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let header = SignatureVerifier::new("whsec_other", 300).sign(&body(), NOW);
        assert_eq!(
            verifier().verify_at(&body(), &header, NOW),
            Err(VerificationError::BadSignature)
        );
    }

    #[test]
    fn test_rejects_replayed_payload_outside_window() {
        let v = verifier();
        let header = v.sign(&body(), NOW);

        assert!(v.verify_at(&body(), &header, NOW + 300).is_ok());
        assert_eq!(
            v.verify_at(&body(), &header, NOW + 301),
            Err(VerificationError::StaleTimestamp)
        );
        // Clock skew in the other direction is bounded too
        assert_eq!(
            v.verify_at(&body(), &header, NOW - 301),
            Err(VerificationError::StaleTimestamp)
        );
    }

    #[test]
    fn test_signature_checked_before_timestamp() {
        let v = verifier();
        let header = v.sign(&body(), NOW);
        let mut tampered = body();
        tampered[0] = b' ';

        assert_eq!(
            v.verify_at(&tampered, &header, NOW + 10_000),
            Err(VerificationError::BadSignature)
        );
    }

    #[test]
    fn test_any_matching_v1_signature_is_accepted() {
        let v = verifier();
        let good = v.sign(&body(), NOW);
        let good_sig = good.split_once("v1=").unwrap().1;
        let header = format!("t={},v1={},v1={},v0=deadbeef", NOW, "ab".repeat(32), good_sig);

        assert!(v.verify_at(&body(), &header, NOW).is_ok());
    }

    #[test]
    fn test_malformed_headers_are_bad_signature() {
        let v = verifier();
        let sig = v.sign(&body(), NOW);
        let sig_only = sig.split_once(',').unwrap().1;

        for header in [
            "",
            "garbage",
            sig_only,
            "t=1700000000",
            "t=notanumber,v1=abcd",
            "t=1700000000,v1=not-hex",
            "t=1700000000,v0=abcd",
        ] {
            assert_eq!(
                v.verify_at(&body(), header, NOW),
                Err(VerificationError::BadSignature),
                "header {:?} should be rejected",
                header
            );
        }
    }

    #[test]
    fn test_signed_non_event_is_malformed() {
        let v = verifier();
        let payload = br#"{"hello":"world"}"#;
        let header = v.sign(payload, NOW);

        assert_eq!(
            v.verify_at(payload, &header, NOW),
            Err(VerificationError::MalformedPayload)
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", verifier());
        assert!(!rendered.contains(SECRET));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(VerificationError::BadSignature.code(), "bad_signature");
        assert_eq!(VerificationError::StaleTimestamp.code(), "stale_timestamp");
        assert_eq!(VerificationError::MalformedPayload.code(), "malformed_payload");
    }
}
