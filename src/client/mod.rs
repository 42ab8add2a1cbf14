//! SSH client shell.
//!
//! One invocation is one connection and one command:
//!
//! 1. Load the identity and, for `secret set`, seal the value to it
//! 2. Resolve the authentication method (agent or key file)
//! 3. Connect with the syringe client banner and a timeout
//! 4. Authenticate, open a session channel and `exec` the encoded command
//! 5. Stream stdout through the response decoder and stderr to the error
//!    sink, then return the remote exit status

pub mod auth;
mod handler;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use russh::{ChannelMsg, client};
use tracing::{debug, info};

use crate::command::crypto::{rsa_private_key, rsa_public_key};
use crate::command::{Invocation, Layout, ResponseDecoder};
use crate::config::{CLIENT_BANNER, ClientConfig};
use crate::error::ClientError;

pub use auth::{AuthMethod, Identity, PasswordReader, TerminalPasswordReader};
pub use handler::KnownHostsHandler;

/// Exit status reported when the server closes the channel without one.
pub const NO_EXIT_STATUS: u32 = 255;

/// Build the russh client configuration.
///
/// The client banner must match the server's allow-list exactly, so it is
/// fixed here rather than configurable.
pub(crate) fn build_client_config(timeout: Duration) -> Arc<client::Config> {
    Arc::new(client::Config {
        client_id: russh::SshId::Standard(CLIENT_BANNER.to_string()),
        inactivity_timeout: Some(timeout),
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// Run `invocation` on the server as `username`.
///
/// Decoded output goes to `out`; remote diagnostics, passphrase prompts and
/// per-field decryption failures go to `err`.
pub async fn run<W: Write, E: Write>(
    config: &ClientConfig,
    username: &str,
    mut invocation: Invocation,
    use_agent: bool,
    out: W,
    mut err: E,
    passwords: &mut dyn PasswordReader,
) -> Result<u32, ClientError> {
    invocation.check()?;
    let mut identity = Identity::load(&config.identity)?;
    if invocation.carries_secret_value() {
        invocation.seal_secret_value(&rsa_public_key(identity.public_key())?)?;
    }

    let method = auth::resolve_auth(&mut identity, use_agent, &mut err, passwords).await?;

    let mut decoder = match Layout::for_path(&invocation.path()) {
        Some(layout) => {
            let key = identity.private_key(&mut err, passwords)?;
            ResponseDecoder::secrets(layout, rsa_private_key(&key)?, out, err)
        }
        None => ResponseDecoder::passthrough(out, err),
    };

    let address = format!("{}:{}", config.host, config.port);
    let handler = KnownHostsHandler::new(
        config.host.clone(),
        config.port,
        config.known_hosts.clone(),
    );
    let connect = client::connect(
        build_client_config(config.connect_timeout),
        (config.host.as_str(), config.port),
        handler,
    );
    let mut handle = tokio::time::timeout(config.connect_timeout, connect)
        .await
        .map_err(|_| ClientError::Timeout(address.clone()))?
        .map_err(|e| ClientError::Connect(format!("{}: {}", address, e)))?;
    debug!("Connected to {}", address);

    auth::authenticate(&mut handle, username, method).await?;

    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ClientError::Channel(e.to_string()))?;
    let command = invocation.encode();
    channel
        .exec(true, command.as_str())
        .await
        .map_err(|e| ClientError::Channel(e.to_string()))?;
    info!("Sent '{}' to {}", invocation.path(), address);

    let mut exit_status = None;
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => decoder.feed(&data)?,
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                // ext == 1 is stderr in SSH protocol
                if ext == 1 {
                    decoder.feed_stderr(&data)?;
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                exit_status = Some(status);
            }
            Some(ChannelMsg::Eof) => {
                if exit_status.is_some() {
                    break;
                }
            }
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }

    let _ = handle
        .disconnect(russh::Disconnect::ByApplication, "", "en")
        .await;
    decoder.finish()?;

    Ok(exit_status.unwrap_or(NO_EXIT_STATUS))
}
