pub mod cipher;
pub mod nonce;
pub mod secret;
pub mod signed_value;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CryptoError {
    #[error("AES cipher secret must be 16, 24, or 32 bytes, got {0}")]
    #[diagnostic(
        code(gateward::encryption::key_length),
        help("set cookie.secret to raw bytes or base64-url of a valid AES key length")
    )]
    InvalidKeyLength(usize),

    #[error("ciphertext too short to carry an initialisation vector")]
    #[diagnostic(code(gateward::encryption::ciphertext_too_short))]
    CiphertextTooShort,

    #[error("system random source failed")]
    #[diagnostic(code(gateward::encryption::random_source))]
    RandomSource(#[source] rand::Error),
}
