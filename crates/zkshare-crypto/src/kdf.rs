//! Key derivation: PBKDF2-HMAC-SHA256 password → file key

use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{fill_random, SymmetricKey};
use crate::{KDF_HASH, KEY_SIZE, PBKDF2_ITERATIONS, SALT_SIZE};

/// Parameters of one password-derived key.
///
/// Iteration count and hash are always the policy constants; only the salt
/// varies, and a fresh one is generated for every encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeyParameters {
    salt: [u8; SALT_SIZE],
    iterations: u32,
    hash_algorithm: &'static str,
}

impl DerivedKeyParameters {
    /// Fresh parameters with a random salt.
    pub fn generate() -> CryptoResult<Self> {
        let mut salt = [0u8; SALT_SIZE];
        fill_random(&mut salt, "salt")?;
        Ok(Self::with_salt(salt))
    }

    /// Parameters for a salt read back from an envelope.
    pub fn from_salt(salt: &[u8]) -> CryptoResult<Self> {
        let salt: [u8; SALT_SIZE] = salt.try_into().map_err(|_| {
            CryptoError::MalformedEnvelope(format!(
                "salt must be {SALT_SIZE} bytes, got {}",
                salt.len()
            ))
        })?;
        Ok(Self::with_salt(salt))
    }

    fn with_salt(salt: [u8; SALT_SIZE]) -> Self {
        Self {
            salt,
            iterations: PBKDF2_ITERATIONS,
            hash_algorithm: KDF_HASH,
        }
    }

    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn hash_algorithm(&self) -> &'static str {
        self.hash_algorithm
    }

    pub fn derive(&self, password: &SecretString) -> SymmetricKey {
        derive_key(password, &self.salt)
    }
}

/// Derive a 256-bit key from a password and salt using PBKDF2-HMAC-SHA256.
///
/// Always succeeds: a wrong password only shows up later as an AEAD
/// authentication failure.
pub fn derive_key(password: &SecretString, salt: &[u8; SALT_SIZE]) -> SymmetricKey {
    let mut bytes = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        PBKDF2_ITERATIONS,
        &mut bytes,
    );
    let key = SymmetricKey::from_bytes(bytes);
    bytes.zeroize();
    key
}
