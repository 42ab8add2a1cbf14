//! Error taxonomy for the syringe server and client.
//!
//! Errors are grouped by the concern that raises them:
//!
//! 1. **Transport** ([`ServerError`], [`ClientError`]): handshake, socket and
//!    channel failures. The session is terminated, nothing is retried.
//!
//! 2. **Identity** ([`StoreError`], [`AuthError`]): key material that cannot be
//!    loaded, fingerprints that do not match, stores that are unavailable.
//!
//! 3. **Validation** ([`ParseError`], [`ValidationError`]): malformed command
//!    lines and request fields, reported with field-level detail.
//!
//! 4. **Decryption** ([`CryptoError`], [`CodecError`]): secret fields that
//!    cannot be opened with the caller's private key, reported per field.
//!
//! 5. **Resource** ([`RouterError`], [`ServiceError`]): tenant databases that
//!    cannot be opened and domain failures inside them.
//!
//! Errors that reach a remote user are rendered through [`ScopedError`] so
//! every rejection has the same shape on the wire.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Session-facing error shape written to a session's error stream.
///
/// Renders as `error: <scope>: <message> (session <id>)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedError {
    pub scope: &'static str,
    pub message: String,
    pub session: String,
}

impl ScopedError {
    pub fn new(scope: &'static str, message: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            scope,
            message: message.into(),
            session: session.into(),
        }
    }
}

impl fmt::Display for ScopedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error: {}: {} (session {})",
            self.scope, self.message, self.session
        )
    }
}

impl std::error::Error for ScopedError {}

/// Identity store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user '{0}' already exists")]
    AlreadyExists(String),

    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

/// Tenant routing failures. Always fatal to the session.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("tenant database for user {user_id} unavailable: {reason}")]
    Unavailable { user_id: String, reason: String },

    #[error("session already bound to tenant {0}")]
    AlreadyResolved(String),
}

/// Domain failures raised by the project, environment and secret services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    #[error("project '{0}' already exists")]
    ProjectExists(String),

    #[error("environment '{environment}' not found in project '{project}'")]
    EnvironmentNotFound { project: String, environment: String },

    #[error("environment '{environment}' already exists in project '{project}'")]
    EnvironmentExists { project: String, environment: String },

    #[error("secret '{key}' not found in {project}/{environment}")]
    SecretNotFound {
        project: String,
        environment: String,
        key: String,
    },

    #[error("failed to persist tenant data: {0}")]
    Persist(String),
}

/// A single invalid request field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Request validation failure carrying every offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_fields(.fields))]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

fn render_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Command line parsing failures on the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no command provided")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),

    #[error("unknown flag '--{0}'")]
    UnknownFlag(String),

    #[error("flag '--{0}' requires a value")]
    MissingFlagValue(String),
}

/// Secret sealing and opening failures.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported key type '{0}', an RSA key is required")]
    UnsupportedKey(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("failed to seal value: {0}")]
    Seal(String),

    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    #[error("cannot decrypt: {0}")]
    Decrypt(String),
}

/// A response field the decoder could not turn into plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecryptableField {
    pub field: String,
    pub reason: String,
}

/// Client-side response decoding failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to write response: {0}")]
    Io(#[from] std::io::Error),

    #[error("{} field(s) could not be decrypted: {}", .0.len(), render_undecryptable(.0))]
    Undecryptable(Vec<UndecryptableField>),

    #[error("{0} must not be empty")]
    EmptyArgument(String),
}

fn render_undecryptable(fields: &[UndecryptableField]) -> String {
    fields
        .iter()
        .map(|f| f.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Client authentication resolution failures. None are retried.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to load public key {path:?}: {reason}")]
    PublicKey { path: PathBuf, reason: String },

    #[error("failed to load private key {path:?}: {reason}")]
    PrivateKey { path: PathBuf, reason: String },

    #[error("failed to read passphrase: {0}")]
    Passphrase(#[source] std::io::Error),

    #[error("ssh agent error: {0}")]
    Agent(String),

    #[error("no signer in agent matches {0}")]
    NoMatchingSigner(String),

    #[error("authentication failed: {0}")]
    Handshake(String),

    #[error("authentication rejected by server")]
    Rejected,
}

/// Client connection failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid address: {0}")]
    Address(String),

    #[error("connection to {0} timed out")]
    Timeout(String),

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("channel error: {0}")]
    Channel(String),
}

/// Server startup and serving failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address {0}")]
    Address(String),

    #[error("host key {path:?}: {reason}")]
    HostKey { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_error_rendering() {
        let err = ScopedError::new("user", "failed to create user 'alice'", "abc123");
        assert_eq!(
            err.to_string(),
            "error: user: failed to create user 'alice' (session abc123)"
        );
    }

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = ValidationError {
            fields: vec![
                FieldError {
                    field: "project name",
                    message: "is required".to_string(),
                },
                FieldError {
                    field: "environment name",
                    message: "must not contain whitespace".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "project name is required\nenvironment name must not contain whitespace"
        );
    }

    #[test]
    fn test_undecryptable_names_fields() {
        let err = CodecError::Undecryptable(vec![
            UndecryptableField {
                field: "API_KEY".to_string(),
                reason: "bad tag".to_string(),
            },
            UndecryptableField {
                field: "DB_URL".to_string(),
                reason: "bad tag".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "2 field(s) could not be decrypted: API_KEY, DB_URL"
        );
    }

    #[test]
    fn test_parse_error_messages() {
        assert_eq!(
            ParseError::UnknownFlag("colour".to_string()).to_string(),
            "unknown flag '--colour'"
        );
        assert_eq!(
            ParseError::MissingArgument("project name").to_string(),
            "missing argument: project name"
        );
    }
}
