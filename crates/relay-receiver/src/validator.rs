//! Signed request verification.
//!
//! ## Security Properties
//!
//! - **HMAC-SHA256 Signatures**: `v0=` + hex MAC over the canonical body
//! - **Freshness Window**: requests older than the window are rejected
//! - **Fail Closed**: no signing key means nothing verifies
//! - **Constant-Time Comparison**: every byte is compared, whatever the first
//!   mismatch position
//!
//! A request timestamped in the future passes the freshness check; only the
//! age upper bound is enforced.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};
use thiserror::Error;

use crate::canonical::{canonical_body, SIGNATURE_VERSION};
use crate::{ActionRequestBody, SignedActionRequest};

type HmacSha256 = Hmac<Sha256>;

/// Why a signed request was rejected.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("signing key not available")]
    MissingSigningKey,

    #[error("request is {age}s old, window is {window}s")]
    Stale { age: i64, window: u64 },

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("failed to canonicalize body: {0}")]
    Canonicalization(#[from] serde_json::Error),
}

/// Verify `request`, reporting the first failed check.
///
/// `now` is unix seconds; `signing_key` is read by the caller at call time.
pub fn verify(
    request: &SignedActionRequest,
    signing_key: Option<&str>,
    now: i64,
    window_seconds: u64,
) -> Result<(), ValidationError> {
    let signing_key = signing_key
        .filter(|key| !key.is_empty())
        .ok_or(ValidationError::MissingSigningKey)?;

    let age = now.saturating_sub(request.body.timestamp);
    if age > i64::try_from(window_seconds).unwrap_or(i64::MAX) {
        return Err(ValidationError::Stale {
            age,
            window: window_seconds,
        });
    }

    let expected = sign(&request.body, signing_key)?;
    if !constant_time_eq(&expected, &request.signature) {
        return Err(ValidationError::SignatureMismatch);
    }

    Ok(())
}

/// Boolean form of [`verify`].
pub fn validate(
    request: &SignedActionRequest,
    signing_key: Option<&str>,
    now: i64,
    window_seconds: u64,
) -> bool {
    verify(request, signing_key, now, window_seconds).is_ok()
}

/// Compute the `v0=<hex>` signature of `body` under `signing_key`.
pub fn sign(body: &ActionRequestBody, signing_key: &str) -> Result<String, serde_json::Error> {
    let message = canonical_body(body)?;

    let mut mac = match HmacSha256::new_from_slice(signing_key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    mac.update(&message);
    let digest = mac.finalize().into_bytes();

    Ok(format!("{}={}", SIGNATURE_VERSION, hex::encode(digest)))
}

/// Constant-time string comparison.
///
/// Runs over the longer of the two inputs; a length difference makes the
/// result false without shortening the loop.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    constant_time_eq_by(a.as_bytes(), b.as_bytes(), |x, y| x.ct_eq(&y))
}

fn constant_time_eq_by<F>(a: &[u8], b: &[u8], mut byte_eq: F) -> bool
where
    F: FnMut(u8, u8) -> Choice,
{
    let len = a.len().max(b.len());
    let mut equal = a.len().ct_eq(&b.len());
    for i in 0..len {
        // Distinct pad bytes so a padded position never matches.
        let x = a.get(i).copied().unwrap_or(0x00);
        let y = b.get(i).copied().unwrap_or(0xFF);
        equal &= byte_eq(x, y);
    }
    equal.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    const SECRET: &str = "s3cr3t";

    fn body(timestamp: i64) -> ActionRequestBody {
        let mut params = Map::new();
        params.insert("pod".to_string(), Value::String("x".to_string()));
        ActionRequestBody {
            account_id: "a".to_string(),
            cluster_name: "c".to_string(),
            action_name: "restart_pod".to_string(),
            timestamp,
            action_params: Some(params),
            sinks: None,
            origin: None,
        }
    }

    fn signed(timestamp: i64) -> SignedActionRequest {
        let body = body(timestamp);
        SignedActionRequest {
            signature: sign(&body, SECRET).unwrap(),
            body,
        }
    }

    #[test]
    fn test_signature_format() {
        let signature = sign(&body(1000), SECRET).unwrap();
        assert!(signature.starts_with("v0="));
        assert_eq!(signature.len(), 3 + 64);
        assert!(signature[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_example_window_boundary() {
        let request = signed(1000);
        assert!(validate(&request, Some(SECRET), 1000, 300));
        assert!(validate(&request, Some(SECRET), 1300, 300));
        assert!(!validate(&request, Some(SECRET), 1301, 300));
    }

    #[test]
    fn test_fresh_request_valid_for_any_window() {
        let request = signed(1_700_000_000);
        for window in [0, 1, 60, 3600, u64::MAX] {
            assert!(validate(&request, Some(SECRET), 1_700_000_000, window));
        }
    }

    #[test]
    fn test_stale_reports_age() {
        let err = verify(&signed(1000), Some(SECRET), 1400, 300).unwrap_err();
        match err {
            ValidationError::Stale { age, window } => {
                assert_eq!(age, 400);
                assert_eq!(window, 300);
            }
            other => panic!("expected stale, got {other:?}"),
        }
    }

    #[test]
    fn test_future_timestamp_is_not_rejected() {
        assert!(validate(&signed(5000), Some(SECRET), 1000, 300));
    }

    #[test]
    fn test_missing_or_empty_key_fails_closed() {
        let request = signed(1000);
        assert!(matches!(
            verify(&request, None, 1000, 300),
            Err(ValidationError::MissingSigningKey)
        ));
        assert!(matches!(
            verify(&request, Some(""), 1000, 300),
            Err(ValidationError::MissingSigningKey)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        assert!(matches!(
            verify(&signed(1000), Some("other"), 1000, 300),
            Err(ValidationError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let mut request = signed(1000);
        request.body.action_name = "delete_namespace".to_string();
        assert!(!validate(&request, Some(SECRET), 1000, 300));

        let mut request = signed(1000);
        request.body.sinks = Some(vec!["attacker".to_string()]);
        assert!(!validate(&request, Some(SECRET), 1000, 300));
    }

    #[test]
    fn test_every_single_bit_flip_rejected() {
        let request = signed(1000);
        let original = request.signature.as_bytes().to_vec();

        for byte in 0..original.len() {
            for bit in 0..8 {
                let mut mutated = original.clone();
                mutated[byte] ^= 1 << bit;
                let Ok(signature) = String::from_utf8(mutated) else {
                    continue;
                };
                let candidate = SignedActionRequest {
                    signature,
                    body: request.body.clone(),
                };
                assert!(
                    !validate(&candidate, Some(SECRET), 1000, 300),
                    "bit {bit} of byte {byte} flipped yet accepted"
                );
            }
        }
    }

    #[test]
    fn test_comparison_count_independent_of_mismatch_position() {
        let expected = sign(&body(1000), SECRET).unwrap();
        let bytes = expected.as_bytes();

        let mut counts = Vec::new();
        for position in 0..bytes.len() {
            let mut other = bytes.to_vec();
            other[position] = if other[position] == b'0' { b'1' } else { b'0' };

            let mut comparisons = 0usize;
            let equal = constant_time_eq_by(bytes, &other, |x, y| {
                comparisons += 1;
                x.ct_eq(&y)
            });
            assert!(!equal);
            counts.push(comparisons);
        }

        let mut comparisons = 0usize;
        assert!(constant_time_eq_by(bytes, bytes, |x, y| {
            comparisons += 1;
            x.ct_eq(&y)
        }));
        counts.push(comparisons);

        assert!(counts.iter().all(|&count| count == bytes.len()));
    }

    #[test]
    fn test_constant_time_eq_lengths() {
        assert!(constant_time_eq("", ""));
        assert!(constant_time_eq("v0=ab", "v0=ab"));
        assert!(!constant_time_eq("v0=ab", "v0=a"));
        assert!(!constant_time_eq("v0=a", "v0=ab"));
        assert!(!constant_time_eq("", "v0="));
    }
}
