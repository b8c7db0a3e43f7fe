//! zkshare-crypto: zero-knowledge file encryption engine primitives
//!
//! Architecture: Derive-or-Generate key, then AES-256-GCM, then pack
//!
//! Pipeline: plaintext → key (random or PBKDF2 from password) → AES-256-GCM → envelope
//!
//! Envelope layout (all integers little-endian):
//! ```text
//! [u32 salt_len][salt (16)][u32 iv_len][iv (12)][ciphertext || tag (16)]
//! ```
//!
//! Every parameter below is a compile-time policy constant. Nothing on the
//! wire or in configuration can lower the KDF cost or change the cipher.

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod seal;

pub use cipher::{decrypt, encrypt, CipherParameters};
pub use envelope::{pack, unpack, EnvelopeParts};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key, DerivedKeyParameters};
pub use keys::{export_key, generate_key, import_key, KeySource, SymmetricKey};
pub use seal::{open, open_parts, seal, OpeningKey, Sealed, SealingKey};

/// Size of an AES-256 key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM IV (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a KDF salt (128-bit)
pub const SALT_SIZE: usize = 16;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Name of the KDF hash, as recorded in derived key parameters
pub const KDF_HASH: &str = "SHA-256";
