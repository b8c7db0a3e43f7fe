use thiserror::Error;
use zkshare_crypto::CryptoError;

pub type ZkResult<T> = Result<T, ZkError>;

#[derive(Debug, Error)]
pub enum ZkError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("config error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("executor unavailable: {0}")]
    ExecutorUnavailable(String),

    #[error("correlation id already in flight: {0}")]
    DuplicateId(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
