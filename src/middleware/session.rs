//! Per-connection session context.

use std::fmt::Display;

use russh::keys::PublicKey;
use uuid::Uuid;

use crate::command::Request;
use crate::error::ScopedError;
use crate::tenant::TenantState;
use crate::types::{Fingerprint, User};

/// Everything the pipeline knows about one connection and its single
/// command.
///
/// Output is buffered and flushed by the server once the pipeline returns.
/// The first exit status set is final.
pub struct Session {
    id: String,
    username: String,
    client_version: String,
    public_key: PublicKey,
    command: String,
    /// Set by the identity provisioner.
    pub fingerprint: Option<Fingerprint>,
    /// Set once provisioning and key verification succeed.
    pub user: Option<User>,
    pub tenant: TenantState,
    /// Set by validation.
    pub request: Option<Request>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_status: Option<u32>,
}

impl Session {
    pub fn new(
        username: impl Into<String>,
        client_version: impl Into<String>,
        public_key: PublicKey,
        command: impl Into<String>,
    ) -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(12);

        Self {
            id,
            username: username.into(),
            client_version: client_version.into(),
            public_key,
            command: command.into(),
            fingerprint: None,
            user: None,
            tenant: TenantState::Unresolved,
            request: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_status: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn client_version(&self) -> &str {
        &self.client_version
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn println(&mut self, line: impl Display) {
        self.stdout.extend_from_slice(format!("{}\n", line).as_bytes());
    }

    pub fn eprintln(&mut self, line: impl Display) {
        self.stderr.extend_from_slice(format!("{}\n", line).as_bytes());
    }

    /// Set the exit status unless one is already set.
    pub fn exit(&mut self, status: u32) {
        self.exit_status.get_or_insert(status);
    }

    /// Write a scoped error to the error stream and exit with status 1.
    pub fn reject(&mut self, scope: &'static str, message: impl Into<String>) {
        let err = ScopedError::new(scope, message, self.id.clone());
        self.eprintln(err);
        self.exit(1);
    }

    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Take the buffered output for flushing to the channel.
    pub fn take_output(&mut self) -> (Vec<u8>, Vec<u8>, u32) {
        (
            std::mem::take(&mut self.stdout),
            std::mem::take(&mut self.stderr),
            self.exit_status.unwrap_or(0),
        )
    }
}
