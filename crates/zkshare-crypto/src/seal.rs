//! Whole-file seal/open: key resolution + AES-256-GCM + envelope packing
//!
//! This is the single code path shared by the background executor and the
//! server-side mirror. Key resolution and the transform are separate steps
//! so callers can observe (and log) each stage.

use secrecy::SecretString;

use crate::cipher::{self, CipherParameters};
use crate::envelope::{self, EnvelopeParts};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::DerivedKeyParameters;
use crate::keys::{export_key, generate_key, import_key, KeySource, SymmetricKey};

/// Output of [`seal`].
pub struct Sealed {
    /// `[u32 salt_len][salt][u32 iv_len][iv][ciphertext || tag]`
    pub envelope: Vec<u8>,
    /// Present only for `KeySource::RandomKey`; owned by the caller from here on
    pub exported_key: Option<SecretString>,
}

impl std::fmt::Debug for Sealed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealed")
            .field("envelope_len", &self.envelope.len())
            .field(
                "exported_key",
                &self.exported_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Key material resolved for one encryption, plus the fresh salt it was
/// derived with (or that will be packed alongside it).
#[derive(Debug)]
pub struct SealingKey {
    key: SymmetricKey,
    kdf: DerivedKeyParameters,
    exported_key: Option<SecretString>,
}

impl SealingKey {
    /// Resolve a key for encryption. A fresh salt is generated on every call
    /// and packed even when no password is involved, so every envelope has
    /// the same layout.
    pub fn resolve(source: &KeySource) -> CryptoResult<Self> {
        let kdf = DerivedKeyParameters::generate()?;
        let (key, exported_key) = match source {
            KeySource::RandomKey => {
                let key = generate_key()?;
                let exported = export_key(&key);
                (key, Some(exported))
            }
            KeySource::Password(password) => (kdf.derive(password), None),
            KeySource::ExportedKey(exported) => (import_key(exported)?, None),
        };
        Ok(Self {
            key,
            kdf,
            exported_key,
        })
    }

    /// Encrypt under a fresh IV and pack the envelope. Consumes the key.
    pub fn seal(self, plaintext: &[u8]) -> CryptoResult<Sealed> {
        let params = CipherParameters::generate()?;
        let ciphertext = cipher::encrypt(&self.key, &params, plaintext)?;
        let envelope = envelope::pack(self.kdf.salt(), params.iv(), &ciphertext)?;

        Ok(Sealed {
            envelope,
            exported_key: self.exported_key,
        })
    }
}

/// Key material resolved for one decryption.
#[derive(Debug)]
pub struct OpeningKey {
    key: SymmetricKey,
}

impl OpeningKey {
    /// Re-derive or import the key. The salt comes from the envelope and is
    /// never regenerated.
    pub fn resolve(salt: &[u8], source: &KeySource) -> CryptoResult<Self> {
        let kdf = DerivedKeyParameters::from_salt(salt)?;
        let key = match source {
            KeySource::RandomKey => return Err(CryptoError::MissingParameter("key")),
            KeySource::Password(password) => kdf.derive(password),
            KeySource::ExportedKey(exported) => import_key(exported)?,
        };
        Ok(Self { key })
    }

    pub fn open(&self, parts: EnvelopeParts<'_>) -> CryptoResult<Vec<u8>> {
        let params = CipherParameters::from_slice(parts.iv)?;
        cipher::decrypt(&self.key, &params, parts.ciphertext)
    }
}

/// Encrypt a whole file into an envelope.
pub fn seal(plaintext: &[u8], source: &KeySource) -> CryptoResult<Sealed> {
    SealingKey::resolve(source)?.seal(plaintext)
}

/// Decrypt an envelope produced by [`seal`].
pub fn open(envelope: &[u8], source: &KeySource) -> CryptoResult<Vec<u8>> {
    let parts = envelope::unpack(envelope)?;
    open_parts(parts, source)
}

/// Decrypt already-separated envelope parts.
pub fn open_parts(parts: EnvelopeParts<'_>, source: &KeySource) -> CryptoResult<Vec<u8>> {
    // Reject a bad IV before paying for the KDF
    CipherParameters::from_slice(parts.iv)?;
    OpeningKey::resolve(parts.salt, source)?.open(parts)
}
