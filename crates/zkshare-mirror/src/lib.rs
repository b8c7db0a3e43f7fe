//! zkshare-mirror: server-side (non zero-knowledge) encryption
//!
//! For deployments where the server holds the password. Uses exactly the
//! same envelope, PBKDF2 policy and AES-256-GCM as the client-side engine;
//! only the password comes from the server instead of the uploader.
//!
//! Password resolution, in order of precedence:
//!   1. caller-supplied password  (only if `[server].allow_user_password`)
//!   2. `$ZKSHARE_DEFAULT_PASSWORD` / `[server].default_password`
//!   3. a one-time password generated at startup (lost on restart!)

pub mod error;
pub mod password;
pub mod server;

pub use error::{MirrorError, MirrorResult};
pub use password::PasswordSource;
pub use server::{ServerCipher, ServerSealed};
