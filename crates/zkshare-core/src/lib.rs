pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{ZkError, ZkResult};
pub use types::{EncryptionRequest, EncryptionResponse, EncryptionResult, Operation};
