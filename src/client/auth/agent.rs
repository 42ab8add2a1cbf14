//! SSH agent signer selection.

use std::io::Write;

use russh::keys::PublicKey;
use russh::keys::agent::client::AgentClient;
use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::error::AuthError;
use crate::types::Fingerprint;

use super::key::Identity;
use super::password::PasswordReader;

pub type Agent = AgentClient<UnixStream>;

/// Connect to the agent named by `SSH_AUTH_SOCK`, if any.
pub async fn connect() -> Option<Agent> {
    match AgentClient::connect_env().await {
        Ok(agent) => Some(agent),
        Err(e) => {
            debug!("SSH agent unavailable: {}", e);
            None
        }
    }
}

async fn holds(agent: &mut Agent, target: &PublicKey) -> Result<bool, AuthError> {
    let identities = agent
        .request_identities()
        .await
        .map_err(|e| AuthError::Agent(e.to_string()))?;
    Ok(identities
        .iter()
        .any(|candidate| candidate.key_data() == target.key_data()))
}

/// Make sure the agent can sign for `identity`, adding its private key when
/// it cannot. Returns the single public key that will be offered.
pub async fn ensure_signer(
    agent: &mut Agent,
    identity: &mut Identity,
    prompt: &mut dyn Write,
    passwords: &mut dyn PasswordReader,
) -> Result<PublicKey, AuthError> {
    let target = identity.public_key().clone();
    if holds(agent, &target).await? {
        debug!("Agent already holds {}", identity.path().display());
        return Ok(target);
    }

    let key = identity.private_key(prompt, passwords)?;
    agent
        .add_identity(&key, &[])
        .await
        .map_err(|e| AuthError::Agent(e.to_string()))?;
    info!("Added {} to the SSH agent", identity.path().display());

    if !holds(agent, &target).await? {
        return Err(AuthError::NoMatchingSigner(Fingerprint::of(&target).to_string()));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use futures::stream;
    use russh::keys::agent::server;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    use super::*;
    use crate::client::auth::key::testing::write_identity;
    use crate::client::auth::password::testing::FixedPassword;
    use crate::types::test_keys;

    /// Serve an in-process agent on a socket under `dir`.
    fn start_agent(dir: &Path) -> PathBuf {
        let socket = dir.join("agent.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let incoming = Box::pin(stream::unfold(listener, |listener| async move {
            let accepted = listener.accept().await.map(|(stream, _)| stream);
            Some((accepted, listener))
        }));
        tokio::spawn(server::serve(incoming, ()));
        socket
    }

    /// An agent that acknowledges every request but never holds a key.
    fn start_forgetful_agent(dir: &Path) -> PathBuf {
        const IDENTITIES_ANSWER: u8 = 12;
        const SUCCESS: u8 = 6;

        let socket = dir.join("forgetful.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            loop {
                let mut len = [0u8; 4];
                if stream.read_exact(&mut len).await.is_err() {
                    return;
                }
                let mut request = vec![0u8; u32::from_be_bytes(len) as usize];
                stream.read_exact(&mut request).await.unwrap();

                let reply: &[u8] = match request.first() {
                    Some(11) => &[0, 0, 0, 5, IDENTITIES_ANSWER, 0, 0, 0, 0],
                    _ => &[0, 0, 0, 1, SUCCESS],
                };
                stream.write_all(reply).await.unwrap();
            }
        });
        socket
    }

    async fn held_keys(agent: &mut Agent) -> Vec<PublicKey> {
        agent.request_identities().await.unwrap()
    }

    #[tokio::test]
    async fn test_agent_already_holding_the_key_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_keys::ed25519();
        let other = test_keys::ed25519();
        let path = write_identity(dir.path(), "id_test", &key, None);
        // Proves the private key file is never needed.
        std::fs::remove_file(&path).unwrap();
        let mut identity = Identity::load(&path).unwrap();

        let mut agent = Agent::connect_uds(start_agent(dir.path())).await.unwrap();
        agent.add_identity(&other, &[]).await.unwrap();
        agent.add_identity(&key, &[]).await.unwrap();

        let mut passwords = FixedPassword::new("unused");
        let mut prompt: Vec<u8> = Vec::new();
        let offered = ensure_signer(&mut agent, &mut identity, &mut prompt, &mut passwords)
            .await
            .unwrap();

        assert_eq!(offered.key_data(), key.public_key().key_data());
        assert_ne!(offered.key_data(), other.public_key().key_data());
        assert_eq!(passwords.reads, 0);
        assert!(prompt.is_empty());
        assert_eq!(held_keys(&mut agent).await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_identity_is_added_then_offered() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_keys::ed25519();
        let path = write_identity(dir.path(), "id_test", &key, Some("s3cret"));
        let mut identity = Identity::load(&path).unwrap();

        let mut agent = Agent::connect_uds(start_agent(dir.path())).await.unwrap();
        assert!(held_keys(&mut agent).await.is_empty());

        let mut prompt: Vec<u8> = Vec::new();
        let mut passwords = FixedPassword::new("s3cret");
        let offered = ensure_signer(&mut agent, &mut identity, &mut prompt, &mut passwords)
            .await
            .unwrap();

        assert_eq!(offered.key_data(), key.public_key().key_data());
        assert_eq!(passwords.reads, 1);
        assert!(String::from_utf8(prompt).unwrap().contains("Enter passphrase"));

        let held = held_keys(&mut agent).await;
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].key_data(), key.public_key().key_data());
    }

    #[tokio::test]
    async fn test_agent_that_drops_the_key_has_no_signer() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_keys::ed25519();
        let path = write_identity(dir.path(), "id_test", &key, None);
        let mut identity = Identity::load(&path).unwrap();

        let mut agent = Agent::connect_uds(start_forgetful_agent(dir.path()))
            .await
            .unwrap();
        let err = ensure_signer(
            &mut agent,
            &mut identity,
            &mut Vec::<u8>::new(),
            &mut FixedPassword::new("unused"),
        )
        .await
        .unwrap_err();

        let expected = Fingerprint::of(key.public_key()).to_string();
        assert!(matches!(err, AuthError::NoMatchingSigner(fp) if fp == expected));
    }
}
