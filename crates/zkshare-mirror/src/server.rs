//! Server-side encrypt/decrypt over the shared envelope format

use std::sync::Arc;
use std::time::Instant;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use zkshare_core::config::ServerConfig;
use zkshare_crypto::{open, seal, KeySource};

use crate::error::{MirrorError, MirrorResult};
use crate::password::{PasswordPolicy, PasswordSource};

/// Result of a server-side encryption.
#[derive(Debug)]
pub struct ServerSealed {
    /// Same layout as the client engine's envelope
    pub envelope: Vec<u8>,
    pub source: PasswordSource,
}

/// Server-side cipher holding the deployment's password policy.
///
/// Cheap to clone; clones share the same one-time password, if any.
#[derive(Clone)]
pub struct ServerCipher {
    policy: Arc<PasswordPolicy>,
}

impl ServerCipher {
    pub fn from_config(config: &ServerConfig) -> MirrorResult<Self> {
        let policy = PasswordPolicy::from_config(config)?;
        info!(
            allow_user_password = config.allow_user_password,
            configured = policy.has_configured_password(),
            "server-side encryption ready"
        );
        Ok(Self {
            policy: Arc::new(policy),
        })
    }

    /// True when a deployment password is configured (no one-time fallback).
    pub fn has_configured_password(&self) -> bool {
        self.policy.has_configured_password()
    }

    pub fn encrypt(
        &self,
        plaintext: &[u8],
        user_password: Option<&SecretString>,
    ) -> MirrorResult<ServerSealed> {
        let (password, source) = self.policy.resolve(user_password)?;
        let start = Instant::now();

        let sealed = seal(plaintext, &KeySource::password(password.expose_secret()))?;

        debug!(
            source = %source,
            bytes = plaintext.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "server encrypt"
        );
        Ok(ServerSealed {
            envelope: sealed.envelope,
            source,
        })
    }

    /// Decrypt with the same resolution chain used to encrypt.
    ///
    /// A file sealed under a one-time password from a previous process fails
    /// here with `AuthenticationFailed`.
    pub fn decrypt(
        &self,
        envelope: &[u8],
        user_password: Option<&SecretString>,
    ) -> MirrorResult<Vec<u8>> {
        let (password, source) = self.policy.resolve(user_password)?;
        let start = Instant::now();

        let plaintext = open(envelope, &KeySource::password(password.expose_secret()))?;

        debug!(
            source = %source,
            bytes = plaintext.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "server decrypt"
        );
        Ok(plaintext)
    }

    /// [`encrypt`](Self::encrypt) on the blocking pool.
    pub async fn encrypt_async(
        &self,
        plaintext: Vec<u8>,
        user_password: Option<SecretString>,
    ) -> MirrorResult<ServerSealed> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.encrypt(&plaintext, user_password.as_ref()))
            .await
            .map_err(|e| MirrorError::Task(e.to_string()))?
    }

    /// [`decrypt`](Self::decrypt) on the blocking pool.
    pub async fn decrypt_async(
        &self,
        envelope: Vec<u8>,
        user_password: Option<SecretString>,
    ) -> MirrorResult<Vec<u8>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.decrypt(&envelope, user_password.as_ref()))
            .await
            .map_err(|e| MirrorError::Task(e.to_string()))?
    }
}
