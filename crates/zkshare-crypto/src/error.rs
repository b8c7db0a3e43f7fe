use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures surfaced by the encryption engine.
///
/// `AuthenticationFailed` covers both a wrong password/key and
/// tampered or corrupted ciphertext; the two are indistinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("incorrect password or corrupted file")]
    AuthenticationFailed,

    #[error("key export failed: {0}")]
    KeyExportFailure(String),
}

impl CryptoError {
    /// Stable machine-readable code, sent on the wire next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            CryptoError::MissingParameter(_) => "missing_parameter",
            CryptoError::UnsupportedOperation(_) => "unsupported_operation",
            CryptoError::MalformedEnvelope(_) => "malformed_envelope",
            CryptoError::AuthenticationFailed => "authentication_failed",
            CryptoError::KeyExportFailure(_) => "key_export_failure",
        }
    }
}
