//! JSON message protocol spoken across the executor boundary
//!
//! Request:
//! ```json
//! {"type": "encrypt", "id": "…", "data": {"file": "<b64>", "password": "…"}}
//! {"type": "decrypt", "id": "…", "data": {"encryptedData": "<b64>", "iv": "<b64>",
//!                                          "salt": "<b64>", "key": "…", "password": "…"}}
//! ```
//!
//! Response:
//! ```json
//! {"type": "success", "id": "…", "result": {"encryptedData": …, "iv": …, "salt": …, "key": …}}
//! {"type": "success", "id": "…", "result": "<b64 plaintext>"}
//! {"type": "error",   "id": "…", "error": "incorrect password or corrupted file",
//!                                "code": "authentication_failed"}
//! ```
//!
//! Binary fields are standard base64.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use zkshare_crypto::{envelope, CryptoError, KeySource};

use crate::types::{EncryptionRequest, EncryptionResponse, EncryptionResult, Operation};

/// Raw request as it arrives on the wire.
///
/// `type` is kept as a string so an unknown operation becomes a typed
/// `UnsupportedOperation` response rather than a parse failure.
#[derive(Deserialize)]
pub struct WireRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub data: WireRequestData,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequestData {
    pub file: Option<String>,
    pub password: Option<String>,
    pub encrypted_data: Option<String>,
    pub iv: Option<String>,
    pub salt: Option<String>,
    pub key: Option<String>,
}

/// A request that could not be turned into an [`EncryptionRequest`].
#[derive(Debug)]
pub struct Rejected {
    /// Correlation id recovered from the message, or empty
    pub id: String,
    pub error: CryptoError,
}

impl Rejected {
    pub fn into_response(self) -> EncryptionResponse {
        EncryptionResponse::failure(self.id, self.error)
    }
}

impl WireRequest {
    /// Validate and convert into an engine request.
    pub fn into_request(self) -> Result<EncryptionRequest, Rejected> {
        let id = self.id;
        let reject = |error| Rejected {
            id: id.clone(),
            error,
        };

        if id.is_empty() {
            return Err(reject(CryptoError::MissingParameter("id")));
        }
        let operation: Operation = self.kind.parse().map_err(reject)?;
        let data = self.data;

        match operation {
            Operation::Encrypt => {
                let file = decode_field(data.file.as_deref(), "file").map_err(reject)?;
                let key_source = match data.password {
                    Some(password) if !password.is_empty() => KeySource::password(password),
                    _ => KeySource::RandomKey,
                };
                Ok(EncryptionRequest::encrypt(id.clone(), file, key_source))
            }
            Operation::Decrypt => {
                let ciphertext = decode_field(data.encrypted_data.as_deref(), "encryptedData")
                    .map_err(reject)?;
                let iv = decode_field(data.iv.as_deref(), "iv").map_err(reject)?;
                let salt = decode_field(data.salt.as_deref(), "salt").map_err(reject)?;
                let key_source = match (data.password, data.key) {
                    (Some(password), _) if !password.is_empty() => KeySource::password(password),
                    (_, Some(key)) if !key.is_empty() => KeySource::exported_key(key),
                    _ => return Err(reject(CryptoError::MissingParameter("key"))),
                };
                let envelope = envelope::pack(&salt, &iv, &ciphertext).map_err(reject)?;
                Ok(EncryptionRequest::decrypt(id.clone(), envelope, key_source))
            }
        }
    }
}

fn decode_field(value: Option<&str>, field: &'static str) -> Result<Vec<u8>, CryptoError> {
    let value = value.ok_or(CryptoError::MissingParameter(field))?;
    B64.decode(value)
        .map_err(|_| CryptoError::MissingParameter(field))
}

/// Parse one JSON message into an engine request.
///
/// Even a message that is not valid JSON yields a `Rejected` carrying
/// whatever `id` could be recovered, so the caller can always answer.
pub fn parse_request(message: &str) -> Result<EncryptionRequest, Rejected> {
    match serde_json::from_str::<WireRequest>(message) {
        Ok(wire) => wire.into_request(),
        Err(e) => Err(Rejected {
            id: recover_id(message),
            error: CryptoError::UnsupportedOperation(format!("invalid request: {e}")),
        }),
    }
}

fn recover_id(message: &str) -> String {
    serde_json::from_str::<serde_json::Value>(message)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .unwrap_or_default()
}

/// Response as written to the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireResponse {
    Success { id: String, result: WireResult },
    Error { id: String, error: String, code: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireResult {
    Encrypted(WireEncrypted),
    /// Base64 plaintext
    Decrypted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEncrypted {
    pub encrypted_data: String,
    pub iv: String,
    pub salt: String,
    pub key: Option<String>,
}

impl WireResponse {
    pub fn id(&self) -> &str {
        match self {
            WireResponse::Success { id, .. } | WireResponse::Error { id, .. } => id,
        }
    }

    pub fn error(id: impl Into<String>, error: &CryptoError) -> Self {
        WireResponse::Error {
            id: id.into(),
            error: error.to_string(),
            code: error.code().to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        // Only strings and options of strings: serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","id":"","error":"serialization failed: {e}","code":"internal"}}"#)
        })
    }
}

impl From<EncryptionResponse> for WireResponse {
    fn from(response: EncryptionResponse) -> Self {
        let id = response.id;
        match response.outcome {
            Err(e) => WireResponse::error(id, &e),
            Ok(EncryptionResult::Decrypted { plaintext }) => WireResponse::Success {
                id,
                result: WireResult::Decrypted(B64.encode(plaintext)),
            },
            Ok(EncryptionResult::Encrypted {
                envelope,
                exported_key,
            }) => match envelope::unpack(&envelope) {
                Ok(parts) => WireResponse::Success {
                    result: WireResult::Encrypted(WireEncrypted {
                        encrypted_data: B64.encode(parts.ciphertext),
                        iv: B64.encode(parts.iv),
                        salt: B64.encode(parts.salt),
                        key: exported_key.map(|k| k.expose_secret().to_string()),
                    }),
                    id,
                },
                Err(e) => WireResponse::error(id, &e),
            },
        }
    }
}
