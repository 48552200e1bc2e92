use base64ct::{Base64Url, Encoding};

/// Normalise a configured cookie secret into key material.
///
/// Secrets are accepted either as base64-url (padding optional, inferred
/// and repaired) or as raw bytes when the value does not decode.
pub fn secret_bytes(secret: &str) -> Vec<u8> {
    if let Some(repaired) = repair_padding(secret) {
        if let Ok(decoded) = Base64Url::decode_vec(&repaired) {
            return decoded;
        }
    }
    secret.as_bytes().to_vec()
}

/// Pad a base64 value out to a multiple of four characters. A remainder of
/// one can never be valid base64, so such values are left to the raw-bytes
/// fallback.
fn repair_padding(secret: &str) -> Option<String> {
    match secret.len() % 4 {
        0 => Some(secret.to_string()),
        2 => Some(format!("{secret}==")),
        3 => Some(format!("{secret}=")),
        _ => None,
    }
}
