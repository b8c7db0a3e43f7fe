//! Key manager: random key generation, key export/import, key sources

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::KEY_SIZE;

/// A 256-bit AES key. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Where the key for a request comes from.
pub enum KeySource {
    /// Generate a fresh random key and export it to the caller (encrypt only)
    RandomKey,
    /// Derive the key from a password with PBKDF2 and a per-file salt
    Password(SecretString),
    /// A key string previously returned by a `RandomKey` encryption
    ExportedKey(SecretString),
}

impl KeySource {
    pub fn password(password: impl Into<String>) -> Self {
        KeySource::Password(SecretString::from(password.into()))
    }

    pub fn exported_key(key: impl Into<String>) -> Self {
        KeySource::ExportedKey(SecretString::from(key.into()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            KeySource::RandomKey => "random_key",
            KeySource::Password(_) => "password",
            KeySource::ExportedKey(_) => "exported_key",
        }
    }
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::RandomKey => f.write_str("RandomKey"),
            KeySource::Password(_) => f.write_str("Password([REDACTED])"),
            KeySource::ExportedKey(_) => f.write_str("ExportedKey([REDACTED])"),
        }
    }
}

/// Fill `buf` from the operating system CSPRNG.
///
/// Uses the fallible path so an unavailable entropy source becomes an error
/// rather than a panic.
pub(crate) fn fill_random(buf: &mut [u8], what: &str) -> CryptoResult<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        tracing::error!(what, "secure random source unavailable: {e}");
        CryptoError::KeyExportFailure(format!("secure random source unavailable for {what}: {e}"))
    })
}

/// Generate a random 256-bit key.
pub fn generate_key() -> CryptoResult<SymmetricKey> {
    let mut bytes = [0u8; KEY_SIZE];
    fill_random(&mut bytes, "key")?;
    let key = SymmetricKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Export a key as URL-safe, unpadded base64.
///
/// The result is the only artifact that can decrypt a `RandomKey` file; it is
/// handed to the caller and never retained here.
pub fn export_key(key: &SymmetricKey) -> SecretString {
    SecretString::from(B64.encode(key.as_bytes()))
}

/// Import a key previously produced by [`export_key`].
///
/// An undecodable or wrong-length string is reported as
/// `AuthenticationFailed`, the same as a valid-looking wrong key.
pub fn import_key(exported: &SecretString) -> CryptoResult<SymmetricKey> {
    let mut decoded = B64
        .decode(exported.expose_secret().trim())
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    if decoded.len() != KEY_SIZE {
        decoded.zeroize();
        return Err(CryptoError::AuthenticationFailed);
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&decoded);
    decoded.zeroize();
    let key = SymmetricKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let k1 = generate_key().unwrap();
        let k2 = generate_key().unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_export_import_roundtrip() {
        let key = generate_key().unwrap();
        let exported = export_key(&key);
        let imported = import_key(&exported).unwrap();
        assert_eq!(key.as_bytes(), imported.as_bytes());
    }

    #[test]
    fn test_exported_key_is_text_safe() {
        let exported = export_key(&SymmetricKey::from_bytes([0xFFu8; KEY_SIZE]));
        let s = exported.expose_secret();
        assert_eq!(s.len(), 43, "32 bytes as unpadded base64");
        assert!(s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_import_rejects_garbage() {
        let result = import_key(&SecretString::from("not base64 !!"));
        assert_eq!(result.unwrap_err(), CryptoError::AuthenticationFailed);
    }

    #[test]
    fn test_import_rejects_wrong_length() {
        let short = SecretString::from(B64.encode([1u8; 16]));
        assert_eq!(
            import_key(&short).unwrap_err(),
            CryptoError::AuthenticationFailed
        );
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SymmetricKey::from_bytes([0x41u8; KEY_SIZE]);
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("65"), "raw key bytes must not appear");

        let source = KeySource::password("hunter2");
        assert!(!format!("{source:?}").contains("hunter2"));
    }
}
