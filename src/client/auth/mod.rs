//! Client authentication resolution.
//!
//! An identity (a key file path without extension) is turned into exactly
//! one [`AuthMethod`]:
//!
//! - [`AuthMethod::Agent`] when an SSH agent is reachable. The agent is
//!   taught the identity's private key if it does not hold it yet, and only
//!   the identity's own public key is ever offered to the server.
//! - [`AuthMethod::DirectKey`] otherwise, signing with the key file itself.
//!
//! Nothing here is retried. A missing key file, a failed passphrase read and
//! an agent without a matching signer are reported as distinct errors.

mod agent;
mod key;
mod password;

use std::io::Write;
use std::sync::Arc;

use russh::client;
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use tracing::{debug, info};

use crate::error::AuthError;

pub use agent::Agent;
pub use key::Identity;
pub use password::{PasswordReader, TerminalPasswordReader};

#[cfg(test)]
pub(crate) use key::testing::write_identity;
#[cfg(test)]
pub(crate) use password::testing::FixedPassword;

/// How the client proves possession of its identity.
pub enum AuthMethod {
    /// Sign through the agent, offering only `key`.
    Agent { agent: Agent, key: PublicKey },
    /// Sign with a key loaded from the identity file.
    DirectKey {
        key: Arc<PrivateKey>,
        passphrase_prompted: bool,
    },
}

impl AuthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Agent { .. } => "agent",
            AuthMethod::DirectKey { .. } => "key",
        }
    }
}

/// Pick the authentication method for `identity`. With `use_agent` unset
/// the agent is never contacted.
pub async fn resolve_auth(
    identity: &mut Identity,
    use_agent: bool,
    prompt: &mut dyn Write,
    passwords: &mut dyn PasswordReader,
) -> Result<AuthMethod, AuthError> {
    if use_agent && let Some(mut agent) = agent::connect().await {
        let key = agent::ensure_signer(&mut agent, identity, prompt, passwords).await?;
        return Ok(AuthMethod::Agent { agent, key });
    }

    debug!("Using identity file {} directly", identity.path().display());
    let key = identity.private_key(prompt, passwords)?;
    Ok(AuthMethod::DirectKey {
        key,
        passphrase_prompted: identity.passphrase_prompted(),
    })
}

/// Authenticate `username` on `handle` with `method`.
pub async fn authenticate<H: client::Handler>(
    handle: &mut client::Handle<H>,
    username: &str,
    method: AuthMethod,
) -> Result<(), AuthError> {
    let name = method.name();

    // For RSA keys, use the best hash algorithm the server supports
    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .ok()
        .flatten()
        .flatten();
    debug!("Using RSA hash algorithm: {:?}", hash_alg);

    let result = match method {
        AuthMethod::Agent { mut agent, key } => handle
            .authenticate_publickey_with(username, key, hash_alg, &mut agent)
            .await
            .map_err(|e| AuthError::Agent(e.to_string()))?,
        AuthMethod::DirectKey { key, .. } => handle
            .authenticate_publickey(username, PrivateKeyWithHashAlg::new(key, hash_alg))
            .await
            .map_err(|e| AuthError::Handshake(e.to_string()))?,
    };

    if !result.success() {
        return Err(AuthError::Rejected);
    }
    info!("Authenticated '{}' with {}", username, name);
    Ok(())
}
