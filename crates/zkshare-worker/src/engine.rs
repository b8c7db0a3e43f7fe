//! Per-request processing: the synchronous, CPU-bound half of the executor.
//!
//! State machine per request:
//! ```text
//! Received ─▶ KeyResolved ─▶ Transformed ─▶ Responded
//!     └──────────▶ Failed ──────────────────▶ Responded
//! ```

use tracing::{debug, trace, warn};
use zeroize::Zeroize;

use zkshare_core::config::WorkerConfig;
use zkshare_core::{EncryptionRequest, EncryptionResponse, EncryptionResult, Operation};
use zkshare_crypto::{envelope, CipherParameters, CryptoError, CryptoResult, KeySource};
use zkshare_crypto::{OpeningKey, SealingKey};

/// Stages a request passes through. Logged at `trace`, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    KeyResolved,
    Transformed,
    Failed,
    Responded,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Received => "received",
            RequestState::KeyResolved => "key_resolved",
            RequestState::Transformed => "transformed",
            RequestState::Failed => "failed",
            RequestState::Responded => "responded",
        }
    }
}

pub(crate) fn transition(id: &str, op: Operation, state: RequestState) {
    trace!(id, op = op.as_str(), state = state.as_str(), "request state");
}

/// Input limits applied before any cryptographic work.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_payload_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for Limits {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            max_payload_bytes: config.max_payload_bytes,
        }
    }
}

/// Process one request to a terminal response carrying the same id.
///
/// Consumes the request: the payload is zeroized when it held plaintext and
/// the key source (a `SecretString`) is dropped here, so nothing about the
/// request outlives the call except the response itself.
pub fn process(request: EncryptionRequest, limits: &Limits) -> EncryptionResponse {
    let EncryptionRequest {
        id,
        operation,
        mut payload,
        key_source,
    } = request;

    transition(&id, operation, RequestState::Received);
    debug!(id = %id, op = operation.as_str(), bytes = payload.len(), "request received");

    let outcome = transform(&id, operation, &payload, &key_source, limits);

    if operation == Operation::Encrypt {
        payload.zeroize();
    }
    drop(key_source);

    if let Err(e) = &outcome {
        transition(&id, operation, RequestState::Failed);
        warn!(id = %id, op = operation.as_str(), code = e.code(), "request failed: {e}");
    }

    EncryptionResponse { id, outcome }
}

fn transform(
    id: &str,
    operation: Operation,
    payload: &[u8],
    source: &KeySource,
    limits: &Limits,
) -> CryptoResult<EncryptionResult> {
    if payload.len() as u64 > limits.max_payload_bytes {
        return Err(CryptoError::UnsupportedOperation(format!(
            "payload exceeds {} bytes",
            limits.max_payload_bytes
        )));
    }

    match operation {
        Operation::Encrypt => {
            let key = SealingKey::resolve(source)?;
            transition(id, operation, RequestState::KeyResolved);

            let sealed = key.seal(payload)?;
            transition(id, operation, RequestState::Transformed);

            Ok(EncryptionResult::Encrypted {
                envelope: sealed.envelope,
                exported_key: sealed.exported_key,
            })
        }
        Operation::Decrypt => {
            let parts = envelope::unpack(payload)?;
            CipherParameters::from_slice(parts.iv)?;

            let key = OpeningKey::resolve(parts.salt, source)?;
            transition(id, operation, RequestState::KeyResolved);

            let plaintext = key.open(parts)?;
            transition(id, operation, RequestState::Transformed);

            Ok(EncryptionResult::Decrypted { plaintext })
        }
    }
}
