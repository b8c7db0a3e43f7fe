//! Dispatcher: bounded request queue → semaphore-gated blocking pool → responses
//!
//! Shutdown closes the request queue but still answers everything already
//! queued or in flight; no request is dropped without a response.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use zkshare_core::config::WorkerConfig;
use zkshare_core::{EncryptionRequest, EncryptionResponse, ZkError, ZkResult};
use zkshare_crypto::CryptoError;

use crate::engine::{self, transition, Limits, RequestState};
use crate::metrics::Metrics;

/// Caller-side handle for submitting requests. Cheap to clone.
#[derive(Clone)]
pub struct ExecutorHandle {
    requests: mpsc::Sender<EncryptionRequest>,
    shutdown: Arc<watch::Sender<bool>>,
    metrics: Metrics,
}

impl ExecutorHandle {
    /// Queue a request. Waits only for queue capacity, never for crypto work.
    pub async fn submit(&self, request: EncryptionRequest) -> ZkResult<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| ZkError::ExecutorUnavailable("request queue closed".into()))
    }

    /// Wait for a free queue slot without sending anything yet.
    ///
    /// Dropping the permit (or the future) gives the slot back, so a caller
    /// can register bookkeeping between reserving and sending without an
    /// await point in between.
    pub async fn reserve(&self) -> ZkResult<mpsc::Permit<'_, EncryptionRequest>> {
        self.requests
            .reserve()
            .await
            .map_err(|_| ZkError::ExecutorUnavailable("request queue closed".into()))
    }

    /// Stop accepting requests; queued and in-flight work still completes.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// A running executor.
pub struct SpawnedExecutor {
    pub handle: ExecutorHandle,
    /// Every submitted request produces exactly one response here
    pub responses: mpsc::Receiver<EncryptionResponse>,
    /// Completes once the queue is closed and all in-flight work is answered
    pub task: JoinHandle<()>,
}

/// Start the executor on the current tokio runtime.
pub fn spawn(config: &WorkerConfig) -> SpawnedExecutor {
    let concurrency = config
        .effective_concurrency()
        .clamp(1, Semaphore::MAX_PERMITS.min(u32::MAX as usize));
    let depth = config.queue_depth.clamp(1, Semaphore::MAX_PERMITS);

    let (request_tx, request_rx) = mpsc::channel(depth);
    let (response_tx, response_rx) = mpsc::channel(depth);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Metrics::new();

    info!(concurrency, queue_depth = depth, "crypto executor ready");

    let task = tokio::spawn(dispatch(
        request_rx,
        response_tx,
        shutdown_rx,
        concurrency as u32,
        Limits::from(config),
        metrics.clone(),
    ));

    SpawnedExecutor {
        handle: ExecutorHandle {
            requests: request_tx,
            shutdown: Arc::new(shutdown_tx),
            metrics,
        },
        responses: response_rx,
        task,
    }
}

async fn dispatch(
    mut requests: mpsc::Receiver<EncryptionRequest>,
    responses: mpsc::Sender<EncryptionResponse>,
    mut shutdown: watch::Receiver<bool>,
    concurrency: u32,
    limits: Limits,
    metrics: Metrics,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency as usize));
    let mut closing = false;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed(), if !closing => {
                info!("executor: shutdown requested, draining queue");
                closing = true;
                requests.close();
            }
            next = requests.recv() => {
                let Some(request) = next else { break };
                let Ok(permit) = semaphore.clone().acquire_owned().await else { break };

                let responses = responses.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let response = run_request(request, limits, &metrics).await;
                    let id = response.id.clone();
                    let op_ok = response.is_success();
                    if responses.send(response).await.is_err() {
                        debug!(id = %id, "response receiver gone; dropping response");
                        return;
                    }
                    debug!(id = %id, success = op_ok, "response sent");
                });
            }
        }
    }

    // Drain: wait for all in-flight requests
    let _ = semaphore.acquire_many(concurrency).await;
    info!("executor: all in-flight requests answered");
}

async fn run_request(
    request: EncryptionRequest,
    limits: Limits,
    metrics: &Metrics,
) -> EncryptionResponse {
    let id = request.id.clone();
    let op = request.operation;
    let bytes = request.payload.len();
    let start = Instant::now();

    let response = match tokio::task::spawn_blocking(move || engine::process(request, &limits))
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(id = %id, op = op.as_str(), "crypto task aborted: {e}");
            transition(&id, op, RequestState::Failed);
            EncryptionResponse::failure(
                id.clone(),
                CryptoError::KeyExportFailure("crypto worker aborted".into()),
            )
        }
    };

    let elapsed = start.elapsed().as_secs_f64();
    metrics.record(op, response.is_success(), elapsed, bytes);
    transition(&id, op, RequestState::Responded);
    debug!(id = %id, op = op.as_str(), elapsed_ms = elapsed * 1000.0, "request done");
    response
}
