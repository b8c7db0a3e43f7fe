use thiserror::Error;
use zkshare_crypto::CryptoError;

pub type MirrorResult<T> = Result<T, MirrorError>;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(
        "no server password configured and the one-time fallback is disabled \
         (set [server].default_password or $ZKSHARE_DEFAULT_PASSWORD)"
    )]
    PasswordNotConfigured,

    #[error("background crypto task failed: {0}")]
    Task(String),
}
