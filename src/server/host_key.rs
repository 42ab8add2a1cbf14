//! Server host key loading and first-run generation.

use std::path::Path;

use russh::keys::PrivateKey;
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::{Algorithm, LineEnding};
use tracing::info;

use crate::error::ServerError;

/// Load the host key at `path`, generating and saving an Ed25519 key with
/// mode 0600 when the file does not exist.
pub async fn load_or_generate(path: &Path) -> Result<PrivateKey, ServerError> {
    let host_key_error = |reason: String| ServerError::HostKey {
        path: path.to_path_buf(),
        reason,
    };

    if path.exists() {
        info!("Loading host key from {}", path.display());
        return russh::keys::load_secret_key(path, None).map_err(|e| host_key_error(e.to_string()));
    }

    info!("Generating new Ed25519 host key");
    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .map_err(|e| host_key_error(e.to_string()))?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let encoded = key
        .to_openssh(LineEnding::LF)
        .map_err(|e| host_key_error(e.to_string()))?;
    tokio::fs::write(path, encoded.as_bytes()).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    info!("Saved host key to {}", path.display());
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generates_then_reloads_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("host_ed25519");

        let generated = load_or_generate(&path).await.unwrap();
        assert!(path.exists());
        let loaded = load_or_generate(&path).await.unwrap();

        assert_eq!(generated.public_key(), loaded.public_key());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generated_key_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host_ed25519");
        load_or_generate(&path).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_garbage_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host_ed25519");
        std::fs::write(&path, b"not a key").unwrap();

        let err = load_or_generate(&path).await.unwrap_err();
        assert!(matches!(err, ServerError::HostKey { .. }));
    }
}
