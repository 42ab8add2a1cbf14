//! russh client handler with trust-on-first-use host key checking.
//!
//! Unknown hosts are learned into the known-hosts file. A host whose key no
//! longer matches its recorded entry is refused.

use std::path::PathBuf;

use russh::client;
use russh::keys::{self, PublicKey};
use tracing::{error, info, warn};

pub struct KnownHostsHandler {
    host: String,
    port: u16,
    known_hosts: PathBuf,
}

impl KnownHostsHandler {
    pub fn new(host: impl Into<String>, port: u16, known_hosts: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port,
            known_hosts: known_hosts.into(),
        }
    }

    /// Whether to trust `key` for this host, learning it on first contact.
    pub fn verify(&self, key: &PublicKey) -> bool {
        match keys::check_known_hosts_path(&self.host, self.port, key, &self.known_hosts) {
            Ok(true) => true,
            Ok(false) => {
                let learned = keys::known_hosts::learn_known_hosts_path(
                    &self.host,
                    self.port,
                    key,
                    &self.known_hosts,
                );
                match learned {
                    Ok(()) => {
                        info!(
                            "Learned {} host key for [{}]:{} into {}",
                            key.algorithm(),
                            self.host,
                            self.port,
                            self.known_hosts.display()
                        );
                        true
                    }
                    Err(e) => {
                        warn!("Failed to record host key for {}: {}", self.host, e);
                        false
                    }
                }
            }
            Err(keys::Error::KeyChanged { line }) => {
                error!(
                    "Host key for [{}]:{} has changed (known hosts line {}), refusing to connect",
                    self.host, self.port, line
                );
                false
            }
            Err(e) => {
                warn!(
                    "Cannot read known hosts file {}: {}",
                    self.known_hosts.display(),
                    e
                );
                false
            }
        }
    }
}

impl client::Handler for KnownHostsHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(self.verify(server_public_key))
    }
}
