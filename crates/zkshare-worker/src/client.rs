//! Caller side of the executor boundary: correlation ids and response demux

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tracing::debug;

use zkshare_core::config::WorkerConfig;
use zkshare_core::protocol::{parse_request, WireResponse};
use zkshare_core::{EncryptionRequest, EncryptionResponse, EncryptionResult, ZkError, ZkResult};
use zkshare_crypto::KeySource;

use crate::executor::{self, ExecutorHandle};
use crate::metrics::Metrics;

type Pending = Arc<TokioMutex<HashMap<String, oneshot::Sender<EncryptionResponse>>>>;

/// Awaitable front-end over a spawned executor.
///
/// Any number of calls may be in flight at once; each one waits only for
/// the response carrying its own correlation id.
pub struct CryptoClient {
    handle: ExecutorHandle,
    pending: Pending,
    executor: JoinHandle<()>,
    demux: JoinHandle<()>,
}

impl CryptoClient {
    /// Spawn an executor and the demux task that routes its responses.
    pub fn spawn(config: &WorkerConfig) -> Self {
        let spawned = executor::spawn(config);
        let pending: Pending = Arc::new(TokioMutex::new(HashMap::new()));
        let demux = tokio::spawn(demux(spawned.responses, pending.clone()));

        Self {
            handle: spawned.handle,
            pending,
            executor: spawned.task,
            demux,
        }
    }

    /// A fresh random correlation id.
    pub fn next_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Submit a request and wait for its matching response.
    ///
    /// Dropping the returned future discards the response; the work itself
    /// is not interrupted. Dropped before a queue slot was free, the request
    /// is never sent and its id is not left behind in the pending map.
    pub async fn call(&self, request: EncryptionRequest) -> ZkResult<EncryptionResponse> {
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();

        let permit = self.handle.reserve().await?;
        {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&id) {
                return Err(ZkError::DuplicateId(id));
            }
            // Registered and sent with no await in between
            pending.insert(id.clone(), tx);
            permit.send(request);
        }

        rx.await.map_err(|_| {
            ZkError::ExecutorUnavailable(format!("executor stopped before answering {id}"))
        })
    }

    /// Encrypt `file`, returning the envelope and (for `RandomKey`) the exported key.
    pub async fn encrypt(&self, file: Vec<u8>, source: KeySource) -> ZkResult<EncryptionResult> {
        let response = self
            .call(EncryptionRequest::encrypt(Self::next_id(), file, source))
            .await?;
        Ok(response.outcome?)
    }

    /// Decrypt an envelope, returning the plaintext.
    pub async fn decrypt(&self, envelope: Vec<u8>, source: KeySource) -> ZkResult<Vec<u8>> {
        let response = self
            .call(EncryptionRequest::decrypt(Self::next_id(), envelope, source))
            .await?;
        match response.outcome? {
            EncryptionResult::Decrypted { plaintext } => Ok(plaintext),
            EncryptionResult::Encrypted { .. } => Err(ZkError::Other(anyhow::anyhow!(
                "executor answered a decrypt with an encrypt result"
            ))),
        }
    }

    /// Handle one JSON protocol message end to end.
    ///
    /// Always produces a well-formed response echoing the request id, even
    /// for unparseable input or a stopped executor.
    pub async fn handle_message(&self, message: &str) -> WireResponse {
        let request = match parse_request(message) {
            Ok(request) => request,
            Err(rejected) => {
                debug!(id = %rejected.id, code = rejected.error.code(), "request rejected");
                return rejected.into_response().into();
            }
        };

        let id = request.id.clone();
        match self.call(request).await {
            Ok(response) => response.into(),
            Err(ZkError::Crypto(e)) => WireResponse::error(id, &e),
            Err(e) => {
                let code = match &e {
                    ZkError::DuplicateId(_) => "duplicate_id",
                    _ => "executor_unavailable",
                };
                WireResponse::Error {
                    id,
                    error: e.to_string(),
                    code: code.into(),
                }
            }
        }
    }

    pub fn metrics(&self) -> &Metrics {
        self.handle.metrics()
    }

    /// Number of calls still waiting for a response.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Stop the executor after answering everything already submitted.
    pub async fn shutdown(self) {
        self.handle.shutdown();
        let _ = self.executor.await;
        drop(self.handle);
        let _ = self.demux.await;
    }
}

async fn demux(mut responses: mpsc::Receiver<EncryptionResponse>, pending: Pending) {
    while let Some(response) = responses.recv().await {
        let waiter = pending.lock().await.remove(&response.id);
        match waiter {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!("caller discarded its response");
                }
            }
            None => debug!(id = %response.id, "no waiter for response; dropping"),
        }
    }

    // Executor gone: wake every remaining waiter with an error
    pending.lock().await.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_encrypt_decrypt_via_client() {
        let client = CryptoClient::spawn(&WorkerConfig::default());

        let result = client
            .encrypt(b"client roundtrip".to_vec(), KeySource::RandomKey)
            .await
            .unwrap();
        let EncryptionResult::Encrypted {
            envelope,
            exported_key,
        } = result
        else {
            panic!("expected Encrypted");
        };
        let key = exported_key.unwrap();

        let plaintext = client
            .decrypt(envelope, KeySource::exported_key(key.expose_secret()))
            .await
            .unwrap();
        assert_eq!(plaintext, b"client roundtrip");
        assert_eq!(client.in_flight().await, 0);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_crypto_error_surfaces_typed() {
        let client = CryptoClient::spawn(&WorkerConfig::default());
        let err = client
            .decrypt(vec![0u8; 3], KeySource::exported_key("k"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ZkError::Crypto(zkshare_crypto::CryptoError::MalformedEnvelope(_))
        ));
        client.shutdown().await;
    }

    #[test]
    fn test_next_id_unique() {
        assert_ne!(CryptoClient::next_id(), CryptoClient::next_id());
    }
}
