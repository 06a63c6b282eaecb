//! Stripe webhook signature scheme.
//!
//! Header format: `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`, where each `v1`
//! is HMAC-SHA256 of `"{t}.{payload}"` keyed by the endpoint secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use marketplace_types::GatewayError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Computes the hex `v1` signature for a payload at `timestamp`.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds a complete `Stripe-Signature` header value.
pub fn header_value(payload: &[u8], secret: &str, timestamp: i64) -> String {
    format!("t={},v1={}", timestamp, sign(payload, secret, timestamp))
}

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>, GatewayError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    GatewayError::InvalidSignature("timestamp is not a number".into())
                })?)
            }
            "v1" => signatures.push(value),
            // v0 and unknown schemes are ignored
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(GatewayError::InvalidSignature("missing v1 signature".into()));
    }

    Ok(ParsedHeader {
        timestamp,
        signatures,
    })
}

/// Verifies `header` against `payload`.
///
/// Rejects timestamps more than `tolerance_secs` away from `now` in either
/// direction. Comparison is constant time.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), GatewayError> {
    let parsed = parse_header(header)?;

    if (now - parsed.timestamp).abs() > tolerance_secs {
        return Err(GatewayError::InvalidSignature(
            "timestamp outside the tolerance zone".into(),
        ));
    }

    let expected = sign(payload, secret, parsed.timestamp);
    let matched = parsed
        .signatures
        .iter()
        .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature(
            "no signature matches the payload".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const PAYLOAD: &[u8] = br#"{"type":"payment_intent.succeeded"}"#;
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_valid_signature() {
        let header = header_value(PAYLOAD, SECRET, NOW);
        assert!(verify(PAYLOAD, &header, SECRET, 300, NOW + 10).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = header_value(PAYLOAD, "wrong_secret", NOW);
        let result = verify(PAYLOAD, &header, SECRET, 300, NOW);
        assert!(matches!(result, Err(GatewayError::InvalidSignature(_))));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let header = header_value(PAYLOAD, SECRET, NOW);
        let tampered = br#"{"type":"payment_intent.succeeded","amount":1}"#;
        assert!(verify(tampered, &header, SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_expired_timestamp_rejected() {
        let header = header_value(PAYLOAD, SECRET, NOW - 600);
        assert!(verify(PAYLOAD, &header, SECRET, 300, NOW).is_err());
        assert!(verify(PAYLOAD, &header, SECRET, 900, NOW).is_ok());
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let valid = sign(PAYLOAD, SECRET, NOW);
        let header = format!("t={},v1={},v1={}", NOW, "deadbeef", valid);
        assert!(verify(PAYLOAD, &header, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        for header in ["", "garbage", "t=1234567890", "v1=abc", "t=abc,v1=abc"] {
            assert!(
                verify(PAYLOAD, header, SECRET, 300, NOW).is_err(),
                "header {:?}",
                header
            );
        }
    }
}
