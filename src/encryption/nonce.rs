use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::encryption::CryptoError;

/// Length of the raw CSRF nonces.
pub const NONCE_LEN: usize = 32;

/// Draw a fresh nonce from the system CSPRNG. Fails rather than degrading
/// when the random source is unavailable.
pub fn nonce() -> Result<Vec<u8>, CryptoError> {
    let mut bytes = vec![0u8; NONCE_LEN];
    rand::thread_rng()
        .try_fill_bytes(&mut bytes)
        .map_err(CryptoError::RandomSource)?;
    Ok(bytes)
}

/// The wire form of a nonce: base64url of its SHA-256 digest. This is what
/// goes into the OAuth `state` parameter and the OIDC `nonce` claim; the
/// raw nonce never leaves the cookie.
pub fn hash_nonce(nonce: &[u8]) -> String {
    let digest = Sha256::digest(nonce);
    Base64UrlUnpadded::encode_string(&digest)
}

/// Constant-time check that `hashed` is the wire hash of `nonce`.
pub fn check_nonce(nonce: &[u8], hashed: &str) -> bool {
    hash_nonce(nonce).as_bytes().ct_eq(hashed.as_bytes()).into()
}
