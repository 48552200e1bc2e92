use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use rand::RngCore;

use crate::encryption::CryptoError;

const IV_LEN: usize = 16;

/// Symmetric cipher capability consumed by the cookie codec.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// AES-CFB with a fresh random IV prepended to each ciphertext.
///
/// CFB rather than an AEAD mode: the cookie secret is reused across many
/// cookies and values, and AEAD modes whose nonce doubles as the IV would
/// risk key+IV reuse. Integrity comes from the signed-value wrapper, not
/// the cipher.
pub struct CfbCipher {
    key: Vec<u8>,
}

impl CfbCipher {
    /// `secret` must already be normalised key material of a valid AES
    /// length (16, 24, or 32 bytes).
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        match secret.len() {
            16 | 24 | 32 => Ok(Self {
                key: secret.to_vec(),
            }),
            n => Err(CryptoError::InvalidKeyLength(n)),
        }
    }

    fn apply(&self, iv: &[u8], buf: &mut [u8], decrypt: bool) -> Result<(), CryptoError> {
        match (self.key.len(), decrypt) {
            (16, false) => Encryptor::<Aes128>::new_from_slices(&self.key, iv)
                .map_err(|_| CryptoError::InvalidKeyLength(self.key.len()))?
                .encrypt(buf),
            (24, false) => Encryptor::<Aes192>::new_from_slices(&self.key, iv)
                .map_err(|_| CryptoError::InvalidKeyLength(self.key.len()))?
                .encrypt(buf),
            (32, false) => Encryptor::<Aes256>::new_from_slices(&self.key, iv)
                .map_err(|_| CryptoError::InvalidKeyLength(self.key.len()))?
                .encrypt(buf),
            (16, true) => Decryptor::<Aes128>::new_from_slices(&self.key, iv)
                .map_err(|_| CryptoError::InvalidKeyLength(self.key.len()))?
                .decrypt(buf),
            (24, true) => Decryptor::<Aes192>::new_from_slices(&self.key, iv)
                .map_err(|_| CryptoError::InvalidKeyLength(self.key.len()))?
                .decrypt(buf),
            (32, true) => Decryptor::<Aes256>::new_from_slices(&self.key, iv)
                .map_err(|_| CryptoError::InvalidKeyLength(self.key.len()))?
                .decrypt(buf),
            (n, _) => return Err(CryptoError::InvalidKeyLength(n)),
        }
        Ok(())
    }
}

type Encryptor<C> = cfb_mode::Encryptor<C>;
type Decryptor<C> = cfb_mode::Decryptor<C>;

impl Cipher for CfbCipher {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng()
            .try_fill_bytes(&mut iv)
            .map_err(CryptoError::RandomSource)?;

        let mut buf = data.to_vec();
        self.apply(&iv, &mut buf, false)?;

        let mut out = Vec::with_capacity(IV_LEN + buf.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&buf);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < IV_LEN {
            return Err(CryptoError::CiphertextTooShort);
        }
        let (iv, ciphertext) = data.split_at(IV_LEN);
        let mut buf = ciphertext.to_vec();
        self.apply(iv, &mut buf, true)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_key_sizes() {
        for len in [16usize, 24, 32] {
            let key = vec![0x42u8; len];
            let cipher = CfbCipher::new(&key).unwrap();
            let plaintext = b"some cookie payload";

            let encrypted = cipher.encrypt(plaintext).unwrap();
            assert_ne!(&encrypted[IV_LEN..], plaintext.as_slice());

            let decrypted = cipher.decrypt(&encrypted).unwrap();
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let cipher = CfbCipher::new(&[7u8; 32]).unwrap();
        let a = cipher.encrypt(b"same input").unwrap();
        let b = cipher.encrypt(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(matches!(
            CfbCipher::new(&[0u8; 15]),
            Err(CryptoError::InvalidKeyLength(15))
        ));
        assert!(matches!(
            CfbCipher::new(&[]),
            Err(CryptoError::InvalidKeyLength(0))
        ));
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        let cipher = CfbCipher::new(&[0u8; 16]).unwrap();
        assert!(matches!(
            cipher.decrypt(&[0u8; 8]),
            Err(CryptoError::CiphertextTooShort)
        ));
    }

    #[test]
    fn test_wrong_key_garbles_plaintext() {
        let cipher = CfbCipher::new(&[1u8; 16]).unwrap();
        let other = CfbCipher::new(&[2u8; 16]).unwrap();
        let encrypted = cipher.encrypt(b"secret contents").unwrap();
        let decrypted = other.decrypt(&encrypted).unwrap();
        assert_ne!(decrypted, b"secret contents");
    }
}
