//! Server password resolution chain

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, warn};

use zkshare_core::config::ServerConfig;
use zkshare_crypto::CryptoError;

use crate::error::{MirrorError, MirrorResult};

/// Where the password used for a file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    /// Supplied by the uploader (deployment allows it)
    User,
    /// Deployment-wide default from config or environment
    Deployment,
    /// Generated at startup; unrecoverable after a restart
    Ephemeral,
}

impl std::fmt::Display for PasswordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PasswordSource::User => "user",
            PasswordSource::Deployment => "deployment",
            PasswordSource::Ephemeral => "ephemeral",
        })
    }
}

/// Resolved password policy for one server process.
pub(crate) struct PasswordPolicy {
    allow_user_password: bool,
    deployment: Option<SecretString>,
    ephemeral: Option<SecretString>,
}

impl PasswordPolicy {
    pub(crate) fn from_config(config: &ServerConfig) -> MirrorResult<Self> {
        let deployment = config
            .default_password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(SecretString::from);

        let ephemeral = match (&deployment, config.require_configured_password) {
            (Some(_), _) => None,
            (None, true) => {
                error!(
                    "server encryption has no configured password and the one-time fallback \
                     is disabled; uploads without an accepted user password will fail"
                );
                None
            }
            (None, false) => {
                error!(
                    "server encryption has no configured password: generated a one-time \
                     password for this process. Files encrypted now CANNOT be decrypted \
                     after a restart. Set [server].default_password or \
                     $ZKSHARE_DEFAULT_PASSWORD."
                );
                Some(generate_one_time_password()?)
            }
        };

        Ok(Self {
            allow_user_password: config.allow_user_password,
            deployment,
            ephemeral,
        })
    }

    /// Pick the password for one operation.
    pub(crate) fn resolve<'a>(
        &'a self,
        user: Option<&'a SecretString>,
    ) -> MirrorResult<(&'a SecretString, PasswordSource)> {
        if let Some(user) = user.filter(|p| !p.expose_secret().is_empty()) {
            if self.allow_user_password {
                return Ok((user, PasswordSource::User));
            }
            warn!("user-supplied password ignored: deployment does not allow user passwords");
        }

        if let Some(password) = &self.deployment {
            return Ok((password, PasswordSource::Deployment));
        }

        if let Some(password) = &self.ephemeral {
            return Ok((password, PasswordSource::Ephemeral));
        }

        Err(MirrorError::PasswordNotConfigured)
    }

    pub(crate) fn has_configured_password(&self) -> bool {
        self.deployment.is_some()
    }
}

/// 32 random bytes, base64 encoded.
fn generate_one_time_password() -> MirrorResult<SecretString> {
    let mut bytes = [0u8; 32];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        CryptoError::KeyExportFailure(format!("secure random source unavailable: {e}"))
    })?;
    let password = B64.encode(bytes);
    bytes.fill(0);
    Ok(SecretString::from(password))
}
