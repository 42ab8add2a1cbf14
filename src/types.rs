//! Core records shared by the server pipeline and the stores.

use std::fmt;

use russh::keys::PublicKey;
use russh::keys::ssh_key::HashAlg;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deterministic identity of a public key: lowercase hex SHA-256 of its
/// SSH wire encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Number of hex characters in a fingerprint.
    pub const LEN: usize = 64;

    pub fn of(key: &PublicKey) -> Self {
        Self(hex::encode(key.fingerprint(HashAlg::Sha256).as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque tenant identifier, assigned on creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A system-wide user with exactly one authorized public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Assigned by the identity store; `None` until the record is created.
    #[serde(default)]
    pub id: Option<UserId>,
    pub username: String,
    pub public_key_fingerprint: Fingerprint,
    /// Placeholder until email verification exists; holds the creation
    /// timestamp.
    pub email: String,
}

impl User {
    /// Build an unsaved first-contact record for `username`.
    pub fn first_contact(username: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            id: None,
            username: username.into(),
            public_key_fingerprint: fingerprint,
            email: chrono::Utc::now().to_rfc3339(),
        }
    }
}
