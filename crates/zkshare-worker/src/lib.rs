//! zkshare-worker: background crypto executor
//!
//! Two independent state machines joined by channels, no shared key state:
//!
//! ```text
//!  caller (CryptoClient)                        executor (dispatcher + blocking pool)
//!  ─────────────────────                        ─────────────────────────────────────
//!  pending: id → oneshot  ── EncryptionRequest ─▶ bounded mpsc ─▶ Semaphore ─▶ spawn_blocking
//!        ▲                                                                         │
//!        └── demux by id ◀────────── EncryptionResponse (same id) ◀───────────────┘
//! ```
//!
//! Responses are not ordered relative to submission; they are paired with
//! their request only by correlation id.

pub mod client;
pub mod engine;
pub mod executor;
pub mod metrics;

pub use client::CryptoClient;
pub use engine::{process, Limits, RequestState};
pub use executor::{spawn, ExecutorHandle, SpawnedExecutor};
pub use metrics::Metrics;
