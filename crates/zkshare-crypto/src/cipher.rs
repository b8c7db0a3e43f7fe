//! AES-256-GCM encryption/decryption
//!
//! Ciphertext format: `[N bytes: ciphertext][16 bytes: GCM tag]`. The IV is
//! carried separately (in the envelope), never prepended here.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{fill_random, SymmetricKey};
use crate::{IV_SIZE, TAG_SIZE};

/// The per-encryption IV. Generated fresh for every encrypt call and read
/// back verbatim on decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherParameters {
    iv: [u8; IV_SIZE],
}

impl CipherParameters {
    pub fn generate() -> CryptoResult<Self> {
        let mut iv = [0u8; IV_SIZE];
        fill_random(&mut iv, "iv")?;
        Ok(Self { iv })
    }

    pub fn from_slice(iv: &[u8]) -> CryptoResult<Self> {
        let iv: [u8; IV_SIZE] = iv.try_into().map_err(|_| {
            CryptoError::MalformedEnvelope(format!("IV must be {IV_SIZE} bytes, got {}", iv.len()))
        })?;
        Ok(Self { iv })
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }
}

/// Encrypt `plaintext` with AES-256-GCM.
///
/// Returns ciphertext with the 16-byte tag appended. The caller must never
/// reuse `params` with the same key.
pub fn encrypt(
    key: &SymmetricKey,
    params: &CipherParameters,
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(params.iv());

    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::UnsupportedOperation("plaintext too large for AES-GCM".into()))
}

/// Decrypt and verify AES-256-GCM ciphertext.
///
/// Wrong key, wrong IV, truncation and tampering all fail identically with
/// `AuthenticationFailed`.
pub fn decrypt(
    key: &SymmetricKey,
    params: &CipherParameters,
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::AuthenticationFailed);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(params.iv());

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_key().unwrap();
        let params = CipherParameters::generate().unwrap();
        let plaintext = b"hello, encrypted world!";

        let ct = encrypt(&key, &params, plaintext).unwrap();
        let pt = decrypt(&key, &params, &ct).unwrap();

        assert_eq!(&pt, plaintext);
    }

    #[test]
    fn test_empty_plaintext_is_tag_only() {
        let key = generate_key().unwrap();
        let params = CipherParameters::generate().unwrap();

        let ct = encrypt(&key, &params, b"").unwrap();
        assert_eq!(ct.len(), TAG_SIZE);
        assert_eq!(decrypt(&key, &params, &ct).unwrap(), b"");
    }

    #[test]
    fn test_encrypted_size() {
        let key = generate_key().unwrap();
        let params = CipherParameters::generate().unwrap();

        let ct = encrypt(&key, &params, &[0u8; 1000]).unwrap();
        assert_eq!(ct.len(), 1000 + TAG_SIZE);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let params = CipherParameters::generate().unwrap();
        let ct = encrypt(&generate_key().unwrap(), &params, b"secret data").unwrap();

        let result = decrypt(&generate_key().unwrap(), &params, &ct);
        assert_eq!(result.unwrap_err(), CryptoError::AuthenticationFailed);
    }

    #[test]
    fn test_decrypt_wrong_iv() {
        let key = generate_key().unwrap();
        let ct = encrypt(&key, &CipherParameters::generate().unwrap(), b"secret").unwrap();

        let result = decrypt(&key, &CipherParameters::generate().unwrap(), &ct);
        assert_eq!(result.unwrap_err(), CryptoError::AuthenticationFailed);
    }

    #[test]
    fn test_decrypt_truncated() {
        let key = generate_key().unwrap();
        let params = CipherParameters::generate().unwrap();

        let result = decrypt(&key, &params, &[0u8; TAG_SIZE - 1]);
        assert_eq!(result.unwrap_err(), CryptoError::AuthenticationFailed);
    }

    #[test]
    fn test_iv_from_slice_length() {
        assert!(CipherParameters::from_slice(&[0u8; IV_SIZE]).is_ok());
        assert!(matches!(
            CipherParameters::from_slice(&[0u8; 16]),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    proptest! {
        /// Flipping any single bit of the ciphertext is detected
        #[test]
        fn tamper_detection(
            plaintext in proptest::collection::vec(any::<u8>(), 0..=512),
            bit in any::<proptest::sample::Index>(),
        ) {
            let key = generate_key().unwrap();
            let params = CipherParameters::generate().unwrap();
            let mut ct = encrypt(&key, &params, &plaintext).unwrap();

            let bit = bit.index(ct.len() * 8);
            ct[bit / 8] ^= 1 << (bit % 8);

            let result = decrypt(&key, &params, &ct);
            prop_assert_eq!(result, Err(CryptoError::AuthenticationFailed));
        }
    }
}
