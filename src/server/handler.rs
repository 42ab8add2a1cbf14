//! Per-connection russh handler.

use std::net::SocketAddr;
use std::sync::Arc;

use russh::keys::PublicKey;
use russh::server::{Auth, Handle, Handler, Msg, Session as SshSession};
use russh::{Channel, ChannelId, CryptoVec};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::middleware::{Pipeline, Session};

/// State shared by every connection.
pub struct Shared {
    pub pipeline: Pipeline,
    pub key_algorithms: Vec<String>,
}

impl Shared {
    pub fn accepts_algorithm(&self, key: &PublicKey) -> bool {
        let algorithm = key.algorithm();
        self.key_algorithms.iter().any(|a| a == algorithm.as_str())
    }
}

/// Handles one SSH connection: public key authentication and a single
/// `exec` request driven through the pipeline.
///
/// The pipeline task belongs to the connection: dropping the handler, which
/// happens when the connection future ends or is aborted, aborts it too.
pub struct ConnectionHandler {
    shared: Arc<Shared>,
    peer: Option<SocketAddr>,
    username: Option<String>,
    public_key: Option<PublicKey>,
    exec_started: bool,
    command: Option<JoinHandle<()>>,
}

impl ConnectionHandler {
    pub fn new(shared: Arc<Shared>, peer: Option<SocketAddr>) -> Self {
        Self {
            shared,
            peer,
            username: None,
            public_key: None,
            exec_started: false,
            command: None,
        }
    }

    fn reject() -> Auth {
        Auth::Reject {
            proceed_with_methods: None,
            partial_success: false,
        }
    }

    async fn refuse(channel: ChannelId, handle: Handle, message: &str) {
        let line = format!("{}\n", message);
        let _ = handle
            .extended_data(channel, 1, CryptoVec::from_slice(line.as_bytes()))
            .await;
        let _ = handle.exit_status_request(channel, 1).await;
        let _ = handle.eof(channel).await;
        let _ = handle.close(channel).await;
    }
}

/// Write the pipeline's buffered output and exit status, then close.
async fn flush(handle: Handle, channel: ChannelId, session: &mut Session) {
    let (stdout, stderr, status) = session.take_output();

    if !stdout.is_empty() {
        let _ = handle.data(channel, CryptoVec::from_slice(&stdout)).await;
    }
    if !stderr.is_empty() {
        let _ = handle.extended_data(channel, 1, CryptoVec::from_slice(&stderr)).await;
    }
    let _ = handle.exit_status_request(channel, status).await;
    let _ = handle.eof(channel).await;
    let _ = handle.close(channel).await;
}

impl Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        if !self.shared.accepts_algorithm(public_key) {
            debug!(
                "Refusing {} key offered by '{}' from {:?}",
                public_key.algorithm(),
                user,
                self.peer
            );
            return Ok(Self::reject());
        }
        Ok(Auth::Accept)
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        if !self.shared.accepts_algorithm(public_key) {
            return Ok(Self::reject());
        }

        // Possession of the key is proven; whether it belongs to `user` is
        // decided by the pipeline so the refusal can be reported in-band.
        debug!("Public key authenticated for '{}' from {:?}", user, self.peer);
        self.username = Some(user.to_string());
        self.public_key = Some(public_key.clone());
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut SshSession,
    ) -> Result<bool, Self::Error> {
        debug!("Session channel opened: {:?}", channel.id());
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        let _ = session.channel_failure(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        info!("Refusing interactive shell from {:?}", self.peer);
        let handle = session.handle();
        tokio::spawn(Self::refuse(
            channel,
            handle,
            "interactive shells are not supported, run a syringe command",
        ));
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        if self.exec_started {
            warn!("Refusing second command on one connection from {:?}", self.peer);
            let _ = session.channel_failure(channel);
            return Ok(());
        }
        self.exec_started = true;

        let (Some(username), Some(public_key)) = (self.username.clone(), self.public_key.clone())
        else {
            let _ = session.channel_failure(channel);
            return Ok(());
        };
        let _ = session.channel_success(channel);

        let client_version = String::from_utf8_lossy(session.remote_sshid())
            .trim_end()
            .to_string();
        let command = String::from_utf8_lossy(data).to_string();
        let mut ctx = Session::new(username, client_version, public_key, command);

        let shared = self.shared.clone();
        let handle = session.handle();
        self.command = Some(tokio::spawn(async move {
            shared.pipeline.run(&mut ctx).await;
            flush(handle, channel, &mut ctx).await;
        }));

        Ok(())
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        if let Some(command) = self.command.take()
            && !command.is_finished()
        {
            debug!("Connection from {:?} ended, aborting its command", self.peer);
            command.abort();
        }
    }
}
