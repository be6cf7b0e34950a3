use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{Result, SidecarError};

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between the provider's signature timestamp and ours.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

// ============================================================================
// Stripe Webhook Verification
// ============================================================================
//
// The Stripe-Signature header carries `t=<unix>,v1=<hex hmac>[,v1=...]`; the
// digest is HMAC-SHA256 over "{t}.{raw body}" with the endpoint signing
// secret. A rejected signature is a 400 before any side effect.
//
// ============================================================================

/// Minimal event envelope; only the fields this sidecar dispatches on.
#[derive(Deserialize, Debug, Clone)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StripeEventData {
    pub object: StripeObject,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StripeObject {
    pub id: String,
}

/// Verify the signature header against the raw payload and parse the event.
pub fn construct_event(payload: &[u8], header: &str, secret: &str) -> Result<StripeEvent> {
    verify_at(payload, header, secret, Utc::now().timestamp())?;
    serde_json::from_slice(payload)
        .map_err(|e| SidecarError::Validation(format!("malformed event payload: {e}")))
}

fn verify_at(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| SidecarError::Signature("missing timestamp in header".to_string()))?;
    if candidates.is_empty() {
        return Err(SidecarError::Signature(
            "missing v1 signature in header".to_string(),
        ));
    }

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SidecarError::Signature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let mut signed_payload = timestamp.to_string().into_bytes();
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(payload);

    for candidate in candidates {
        let Ok(candidate_bytes) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SidecarError::Configuration("invalid webhook secret".to_string()))?;
        mac.update(&signed_payload);
        // Constant-time comparison
        if mac.verify_slice(&candidate_bytes).is_ok() {
            return Ok(());
        }
    }

    Err(SidecarError::Signature("digest mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &[u8], timestamp: i64, secret: &str) -> String {
        let mut signed = timestamp.to_string().into_bytes();
        signed.push(b'.');
        signed.extend_from_slice(payload);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(&signed);
        hex::encode(mac.finalize().into_bytes())
    }

    fn header_for(payload: &[u8], timestamp: i64) -> String {
        format!("t={},v1={}", timestamp, sign(payload, timestamp, SECRET))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload =
            br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        let now = Utc::now().timestamp();

        let event = construct_event(payload, &header_for(payload, now), SECRET).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.data.object.id, "pi_1");
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let payload = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        let now = Utc::now().timestamp();
        let header = header_for(payload, now);

        let tampered = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_2"}}}"#;
        let result = construct_event(tampered, &header, SECRET);
        assert!(matches!(result, Err(SidecarError::Signature(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = br#"{}"#;
        let now = Utc::now().timestamp();
        let header = format!("t={},v1={}", now, sign(payload, now, "whsec_other"));

        let result = construct_event(payload, &header, SECRET);
        assert!(matches!(result, Err(SidecarError::Signature(_))));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = br#"{}"#;
        let stale = Utc::now().timestamp() - 3600;

        let result = construct_event(payload, &header_for(payload, stale), SECRET);
        assert!(matches!(result, Err(SidecarError::Signature(_))));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let result = verify_at(b"{}", "not-a-signature-header", SECRET, Utc::now().timestamp());
        assert!(matches!(result, Err(SidecarError::Signature(_))));
    }

    #[test]
    fn test_second_v1_candidate_accepted() {
        // Secret rotation sends two v1 entries; either may match
        let payload = br#"{"type":"x","data":{"object":{"id":"pi_1"}}}"#;
        let now = Utc::now().timestamp();
        let good = sign(payload, now, SECRET);
        let header = format!("t={now},v1={},v1={good}", "00".repeat(32));

        assert!(construct_event(payload, &header, SECRET).is_ok());
    }
}
