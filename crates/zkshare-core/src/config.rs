use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ZkError, ZkResult};

/// Environment variable that overrides `[server].default_password`
pub const DEFAULT_PASSWORD_ENV: &str = "ZKSHARE_DEFAULT_PASSWORD";

/// Top-level configuration (loaded from zkshare.toml)
///
/// Cryptographic parameters are absent: cipher, key/IV/salt
/// sizes and KDF cost are compile-time constants in `zkshare-crypto`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZkConfig {
    pub log: LogConfig,
    pub encryption: EncryptionPolicy,
    pub worker: WorkerConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Caller-side policy: whether and where files get encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionPolicy {
    /// Encrypt uploads at all (default: true)
    pub enabled: bool,
    /// Encrypt client-side through the executor; false selects the server mirror
    pub zero_knowledge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Max requests processed at once (0 = cpu_count)
    pub concurrency: usize,
    /// Capacity of the request channel
    pub queue_depth: usize,
    /// Largest accepted request payload in bytes
    pub max_payload_bytes: u64,
}

/// Server-side mirror settings (system-held password mode).
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Honour a password supplied by the uploader
    pub allow_user_password: bool,
    /// Deployment-wide password; never written back out
    #[serde(skip_serializing)]
    pub default_password: Option<String>,
    /// Refuse to fall back to a one-time password when nothing is configured
    pub require_configured_password: bool,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("allow_user_password", &self.allow_user_password)
            .field(
                "default_password",
                &self.default_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "require_configured_password",
                &self.require_configured_password,
            )
            .finish()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for EncryptionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            zero_knowledge: true,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            queue_depth: 64,
            max_payload_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl WorkerConfig {
    /// Concurrency with `0` resolved to the number of available CPUs.
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency > 0 {
            return self.concurrency;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

impl ZkConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> ZkResult<Self> {
        toml::from_str(content).map_err(|e| ZkError::Config(e.to_string()))
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    ///
    /// Environment overrides are applied afterwards.
    pub fn load(path: &Path) -> ZkResult<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
                .map_err(|e| ZkError::Config(format!("parsing {}: {e}", path.display())))?
        } else {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var(DEFAULT_PASSWORD_ENV) {
            if !password.is_empty() {
                self.server.default_password = Some(password);
            }
        }
    }

    pub fn to_toml(&self) -> ZkResult<String> {
        toml::to_string_pretty(self).map_err(|e| ZkError::Config(e.to_string()))
    }
}
