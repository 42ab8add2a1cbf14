//! Client-side encoding of a structured invocation into the remote command
//! string carried by the SSH `exec` request.

use std::collections::BTreeMap;

use rsa::RsaPublicKey;

use crate::error::{CodecError, CryptoError};

use super::crypto;

/// Local-only flag naming the client identity; never sent to the server.
pub const IDENTITY_FLAG: &str = "identity";

/// A command as invoked locally: its route, positional arguments and the
/// flags the user set explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    path: Vec<String>,
    args: Vec<String>,
    // Ordered by name so encoding never depends on the order flags were set.
    flags: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a flag. Setting the same flag twice keeps the last value.
    pub fn flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.insert(name.into(), value.into());
        self
    }

    /// Space-joined command route, e.g. `secret list`.
    pub fn path(&self) -> String {
        self.path.join(" ")
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn remote_flags(&self) -> impl Iterator<Item = (&String, &String)> {
        self.flags
            .iter()
            .filter(|(name, _)| name.as_str() != IDENTITY_FLAG)
    }

    /// Refuse blank positional arguments and flag values. Either would
    /// vanish from the whitespace-separated command and shift what follows.
    pub fn check(&self) -> Result<(), CodecError> {
        if let Some(position) = self.args.iter().position(|a| a.trim().is_empty()) {
            return Err(CodecError::EmptyArgument(format!("argument {}", position + 1)));
        }
        if let Some((name, _)) = self.remote_flags().find(|(_, v)| v.trim().is_empty()) {
            return Err(CodecError::EmptyArgument(format!("--{}", name)));
        }
        Ok(())
    }

    /// Canonical remote command: `<path> <args> --name value ...`.
    pub fn encode(&self) -> String {
        let flags = self
            .remote_flags()
            .map(|(name, value)| format!("--{} {}", name, value));

        self.path
            .iter()
            .chain(self.args.iter())
            .cloned()
            .chain(flags)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether this is `secret set <key> <value>`, whose value is sealed
    /// before it leaves the client.
    pub fn carries_secret_value(&self) -> bool {
        self.path() == "secret set"
    }

    /// For `secret set <key> <value>`, replace the plaintext value with one
    /// sealed to `key`. Other invocations are left untouched.
    pub fn seal_secret_value(&mut self, key: &RsaPublicKey) -> Result<(), CryptoError> {
        if !self.carries_secret_value() {
            return Ok(());
        }
        if let Some(value) = self.args.get_mut(1) {
            *value = crypto::seal(key, value.as_bytes())?;
        }
        Ok(())
    }
}
