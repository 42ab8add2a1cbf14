//! Identity key files: `<identity>.pub` and its private counterpart.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::{self, PrivateKey, PublicKey};
use tracing::debug;

use crate::error::AuthError;

use super::password::PasswordReader;

/// A named client identity. The private key is loaded on first use and then
/// kept, so a passphrase is asked for at most once per invocation.
pub struct Identity {
    path: PathBuf,
    public: PublicKey,
    private: Option<Arc<PrivateKey>>,
    passphrase_prompted: bool,
}

impl Identity {
    /// Load the public half from `<path>.pub`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();
        let public_path = public_key_path(&path);
        let public = keys::load_public_key(&public_path).map_err(|e| AuthError::PublicKey {
            path: public_path.clone(),
            reason: e.to_string(),
        })?;

        debug!("Loaded {} public key from {}", public.algorithm(), public_path.display());
        Ok(Self {
            path,
            public,
            private: None,
            passphrase_prompted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn passphrase_prompted(&self) -> bool {
        self.passphrase_prompted
    }

    /// The private key, prompting on `prompt` for a passphrase when the
    /// file is encrypted.
    pub fn private_key(
        &mut self,
        prompt: &mut dyn Write,
        passwords: &mut dyn PasswordReader,
    ) -> Result<Arc<PrivateKey>, AuthError> {
        if let Some(key) = &self.private {
            return Ok(key.clone());
        }

        let key = match keys::load_secret_key(&self.path, None) {
            Ok(key) => key,
            Err(keys::Error::KeyIsEncrypted) => {
                write!(prompt, "Enter passphrase for {}: ", self.path.display())
                    .and_then(|_| prompt.flush())
                    .map_err(AuthError::Passphrase)?;
                let passphrase = passwords.read_password().map_err(AuthError::Passphrase)?;
                self.passphrase_prompted = true;
                keys::load_secret_key(&self.path, Some(passphrase.as_str()))
                    .map_err(|e| self.private_error(e.to_string()))?
            }
            Err(e) => return Err(self.private_error(e.to_string())),
        };

        if key.public_key().key_data() != self.public.key_data() {
            return Err(self.private_error("does not match the public key".to_string()));
        }

        let key = Arc::new(key);
        self.private = Some(key.clone());
        Ok(key)
    }

    fn private_error(&self, reason: String) -> AuthError {
        AuthError::PrivateKey {
            path: self.path.clone(),
            reason,
        }
    }
}

fn public_key_path(identity: &Path) -> PathBuf {
    let mut path = OsString::from(identity.as_os_str());
    path.push(".pub");
    PathBuf::from(path)
}


#[cfg(test)]
mod tests {
    use super::testing::write_identity;
    use super::*;
    use crate::client::auth::password::testing::{BrokenTerminal, FixedPassword};
    use crate::types::test_keys;

    #[test]
    fn test_public_key_path_appends_extension() {
        assert_eq!(
            public_key_path(Path::new("/home/alice/.ssh/id_rsa")),
            PathBuf::from("/home/alice/.ssh/id_rsa.pub")
        );
    }

    #[test]
    fn test_missing_public_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Identity::load(dir.path().join("id_missing")).err().unwrap();
        match err {
            AuthError::PublicKey { path, .. } => {
                assert_eq!(path, dir.path().join("id_missing.pub"));
            }
            other => panic!("expected public key error, got {:?}", other),
        }
    }

    #[test]
    fn test_unencrypted_key_loads_without_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_keys::ed25519();
        let path = write_identity(dir.path(), "id_test", &key, None);

        let mut identity = Identity::load(&path).unwrap();
        assert_eq!(identity.public_key().key_data(), key.public_key().key_data());

        let mut prompt: Vec<u8> = Vec::new();
        let mut passwords = FixedPassword::new("unused");
        let loaded = identity.private_key(&mut prompt, &mut passwords).unwrap();

        assert_eq!(loaded.public_key().key_data(), key.public_key().key_data());
        assert!(prompt.is_empty());
        assert_eq!(passwords.reads, 0);
        assert!(!identity.passphrase_prompted());
    }

    #[test]
    fn test_encrypted_key_prompts_once() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_keys::ed25519();
        let path = write_identity(dir.path(), "id_test", &key, Some("correct horse"));

        let mut identity = Identity::load(&path).unwrap();
        let mut prompt: Vec<u8> = Vec::new();
        let mut passwords = FixedPassword::new("correct horse");

        identity.private_key(&mut prompt, &mut passwords).unwrap();
        identity.private_key(&mut prompt, &mut passwords).unwrap();

        assert_eq!(passwords.reads, 1);
        assert!(identity.passphrase_prompted());
        let prompt = String::from_utf8(prompt).unwrap();
        assert_eq!(prompt, format!("Enter passphrase for {}: ", path.display()));
    }

    #[test]
    fn test_wrong_passphrase_is_a_private_key_error() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_keys::ed25519();
        let path = write_identity(dir.path(), "id_test", &key, Some("correct horse"));

        let mut identity = Identity::load(&path).unwrap();
        let err = identity
            .private_key(&mut Vec::<u8>::new(), &mut FixedPassword::new("battery staple"))
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::PrivateKey { .. }));
    }

    #[test]
    fn test_passphrase_read_failure_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let key = test_keys::ed25519();
        let path = write_identity(dir.path(), "id_test", &key, Some("correct horse"));

        let mut identity = Identity::load(&path).unwrap();
        let err = identity
            .private_key(&mut Vec::<u8>::new(), &mut BrokenTerminal)
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::Passphrase(_)));
        assert!(!identity.passphrase_prompted());
    }

    #[test]
    fn test_mismatched_pair_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_identity(dir.path(), "id_test", &test_keys::ed25519(), None);
        // Replace the public half with an unrelated key.
        std::fs::write(
            dir.path().join("id_test.pub"),
            test_keys::ed25519().public_key().to_openssh().unwrap(),
        )
        .unwrap();

        let mut identity = Identity::load(&path).unwrap();
        let err = identity
            .private_key(&mut Vec::<u8>::new(), &mut FixedPassword::new("unused"))
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::PrivateKey { .. }));
    }
}
