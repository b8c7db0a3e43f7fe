use serde::{Deserialize, Serialize};
use std::str::FromStr;

use secrecy::SecretString;
use zkshare_crypto::{CryptoError, KeySource};

/// Requested engine operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Encrypt,
    Decrypt,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Encrypt => "encrypt",
            Operation::Decrypt => "decrypt",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "encrypt" => Ok(Operation::Encrypt),
            "decrypt" => Ok(Operation::Decrypt),
            other => Err(CryptoError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// One-shot request consumed exactly once by the executor.
///
/// `payload` is the raw file for `Encrypt` and a packed envelope for
/// `Decrypt`.
pub struct EncryptionRequest {
    pub id: String,
    pub operation: Operation,
    pub payload: Vec<u8>,
    pub key_source: KeySource,
}

impl EncryptionRequest {
    pub fn encrypt(id: impl Into<String>, file: Vec<u8>, key_source: KeySource) -> Self {
        Self {
            id: id.into(),
            operation: Operation::Encrypt,
            payload: file,
            key_source,
        }
    }

    pub fn decrypt(id: impl Into<String>, envelope: Vec<u8>, key_source: KeySource) -> Self {
        Self {
            id: id.into(),
            operation: Operation::Decrypt,
            payload: envelope,
            key_source,
        }
    }
}

impl std::fmt::Debug for EncryptionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionRequest")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("payload_len", &self.payload.len())
            .field("key_source", &self.key_source)
            .finish()
    }
}

/// Success payload of a request.
pub enum EncryptionResult {
    Encrypted {
        envelope: Vec<u8>,
        /// Present only for `KeySource::RandomKey`
        exported_key: Option<SecretString>,
    },
    Decrypted {
        plaintext: Vec<u8>,
    },
}

impl std::fmt::Debug for EncryptionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncryptionResult::Encrypted {
                envelope,
                exported_key,
            } => f
                .debug_struct("Encrypted")
                .field("envelope_len", &envelope.len())
                .field("exported_key", &exported_key.as_ref().map(|_| "[REDACTED]"))
                .finish(),
            EncryptionResult::Decrypted { plaintext } => f
                .debug_struct("Decrypted")
                .field("plaintext_len", &plaintext.len())
                .finish(),
        }
    }
}

/// Terminal response, tagged with the originating request's id.
#[derive(Debug)]
pub struct EncryptionResponse {
    pub id: String,
    pub outcome: Result<EncryptionResult, CryptoError>,
}

impl EncryptionResponse {
    pub fn success(id: impl Into<String>, result: EncryptionResult) -> Self {
        Self {
            id: id.into(),
            outcome: Ok(result),
        }
    }

    pub fn failure(id: impl Into<String>, error: CryptoError) -> Self {
        Self {
            id: id.into(),
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
