use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64ct::{Base64Url, Encoding};
use hmac::{Hmac, Mac};
use miette::Diagnostic;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Clock skew tolerated for timestamps from the future.
const FUTURE_SKEW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error, Diagnostic, Clone, Copy, PartialEq, Eq)]
pub enum SignedValueError {
    #[error("signed value failed validation")]
    #[diagnostic(code(gateward::encryption::signature_invalid))]
    SignatureInvalid,

    #[error("signed value timestamp outside the validity window")]
    #[diagnostic(code(gateward::encryption::expired))]
    Expired,
}

/// Wrap a payload as `b64url(payload)|unix-seconds|b64url(hmac-sha256)`.
///
/// The HMAC covers the owning name as well as the payload and timestamp,
/// so a value minted under one name can never validate under another.
pub fn sign(secret: &str, name: &str, payload: &[u8], now: SystemTime) -> String {
    let encoded = Base64Url::encode_string(payload);
    let timestamp = unix_seconds(now).to_string();
    let signature = signature(secret, name, &encoded, &timestamp);
    format!("{encoded}|{timestamp}|{signature}")
}

/// Validate a signed value and recover the payload.
///
/// The signature check runs before anything derived from the value is
/// trusted, and in constant time. Timestamps older than `expire`, or more
/// than a small skew in the future, are rejected as expired.
pub fn validate(
    secret: &str,
    name: &str,
    value: &str,
    expire: Duration,
    now: SystemTime,
) -> Result<Vec<u8>, SignedValueError> {
    let mut parts = value.splitn(3, '|');
    let (Some(encoded), Some(timestamp), Some(provided)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(SignedValueError::SignatureInvalid);
    };

    let expected = signature(secret, name, encoded, timestamp);
    if !bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        return Err(SignedValueError::SignatureInvalid);
    }

    let stamped: u64 = timestamp
        .parse()
        .map_err(|_| SignedValueError::SignatureInvalid)?;
    let now_secs = unix_seconds(now);
    if stamped.saturating_add(expire.as_secs()) < now_secs {
        return Err(SignedValueError::Expired);
    }
    if stamped > now_secs.saturating_add(FUTURE_SKEW.as_secs()) {
        return Err(SignedValueError::Expired);
    }

    Base64Url::decode_vec(encoded).map_err(|_| SignedValueError::SignatureInvalid)
}

fn signature(secret: &str, name: &str, encoded: &str, timestamp: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(name.as_bytes());
    mac.update(b"|");
    mac.update(encoded.as_bytes());
    mac.update(b"|");
    mac.update(timestamp.as_bytes());
    Base64Url::encode_string(&mac.finalize().into_bytes())
}

fn unix_seconds(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "signing-secret";
    const NAME: &str = "_gateward_csrf";
    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_round_trip() {
        let now = SystemTime::now();
        let value = sign(SECRET, NAME, b"payload bytes", now);
        let payload = validate(SECRET, NAME, &value, HOUR, now).unwrap();
        assert_eq!(payload, b"payload bytes");
    }

    #[test]
    fn test_wire_shape() {
        let value = sign(SECRET, NAME, b"x", SystemTime::now());
        let parts: Vec<&str> = value.split('|').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_name_binding() {
        let now = SystemTime::now();
        let value = sign(SECRET, "_a_csrf", b"payload", now);
        assert_eq!(
            validate(SECRET, "_b_csrf", &value, HOUR, now),
            Err(SignedValueError::SignatureInvalid)
        );
    }

    #[test]
    fn test_wrong_secret() {
        let now = SystemTime::now();
        let value = sign(SECRET, NAME, b"payload", now);
        assert_eq!(
            validate("other-secret", NAME, &value, HOUR, now),
            Err(SignedValueError::SignatureInvalid)
        );
    }

    #[test]
    fn test_tampered_payload() {
        let now = SystemTime::now();
        let value = sign(SECRET, NAME, b"payload", now);
        let tampered = format!("AAAA{}", &value[4..]);
        assert_eq!(
            validate(SECRET, NAME, &tampered, HOUR, now),
            Err(SignedValueError::SignatureInvalid)
        );
    }

    #[test]
    fn test_tampered_timestamp() {
        let now = SystemTime::now();
        let value = sign(SECRET, NAME, b"payload", now);
        let mut parts: Vec<String> = value.split('|').map(String::from).collect();
        parts[1] = unix_seconds(now).saturating_add(60).to_string();
        assert_eq!(
            validate(SECRET, NAME, &parts.join("|"), HOUR, now),
            Err(SignedValueError::SignatureInvalid)
        );
    }

    #[test]
    fn test_missing_parts() {
        assert_eq!(
            validate(SECRET, NAME, "only-one-part", HOUR, SystemTime::now()),
            Err(SignedValueError::SignatureInvalid)
        );
        assert_eq!(
            validate(SECRET, NAME, "two|parts", HOUR, SystemTime::now()),
            Err(SignedValueError::SignatureInvalid)
        );
    }

    #[test]
    fn test_expiry() {
        let minted = SystemTime::now();
        let value = sign(SECRET, NAME, b"payload", minted);

        let just_inside = minted + HOUR - Duration::from_secs(1);
        assert!(validate(SECRET, NAME, &value, HOUR, just_inside).is_ok());

        let just_outside = minted + HOUR + Duration::from_secs(1);
        assert_eq!(
            validate(SECRET, NAME, &value, HOUR, just_outside),
            Err(SignedValueError::Expired)
        );
    }

    #[test]
    fn test_future_timestamps_rejected_beyond_skew() {
        let now = SystemTime::now();
        let near_future = sign(SECRET, NAME, b"payload", now + Duration::from_secs(60));
        assert!(validate(SECRET, NAME, &near_future, HOUR, now).is_ok());

        let far_future = sign(SECRET, NAME, b"payload", now + HOUR);
        assert_eq!(
            validate(SECRET, NAME, &far_future, HOUR, now),
            Err(SignedValueError::Expired)
        );
    }
}
