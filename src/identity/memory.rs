//! DashMap-based identity store.
//!
//! Users are keyed by username. Creation goes through the `DashMap` entry
//! API, which holds the shard lock for the key while checking and inserting,
//! so concurrent first contacts for one username produce a single record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::types::{User, UserId};

use super::traits::IdentityStore;

/// File name of the system snapshot inside the data directory.
pub(crate) const SYSTEM_SNAPSHOT: &str = "system.json";

/// In-memory implementation of [`IdentityStore`].
pub struct MemoryIdentityStore {
    users: DashMap<String, User>,
    snapshot: Option<PathBuf>,
    // Serializes snapshot writes so the file never interleaves two dumps.
    write_lock: Mutex<()>,
}

impl MemoryIdentityStore {
    /// Create an empty store that lives only in memory.
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            snapshot: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Open a store backed by `<data_dir>/system.json`, loading existing users.
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join(SYSTEM_SNAPSHOT);
        let users = DashMap::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<User> = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Unavailable(format!("{:?}: {}", path, e)))?;
                for user in records {
                    users.insert(user.username.clone(), user);
                }
                info!("Loaded {} user(s) from {:?}", users.len(), path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No identity snapshot at {:?}, starting empty", path);
            }
            Err(e) => return Err(StoreError::Unavailable(format!("{:?}: {}", path, e))),
        }

        Ok(Self {
            users,
            snapshot: Some(path),
            write_lock: Mutex::new(()),
        })
    }

    /// Number of stored users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let mut records: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        records.sort_by(|a, b| a.username.cmp(&b.username));

        let bytes = serde_json::to_vec_pretty(&records)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(format!("{:?}: {}", parent, e)))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{:?}: {}", path, e)))
    }
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(username).map(|entry| entry.value().clone()))
    }

    async fn create(&self, mut user: User) -> Result<UserId, StoreError> {
        let username = user.username.clone();
        let id = match self.users.entry(username.clone()) {
            Entry::Occupied(_) => return Err(StoreError::AlreadyExists(user.username)),
            Entry::Vacant(slot) => {
                let id = UserId::new();
                user.id = Some(id);
                slot.insert(user);
                id
            }
        };

        if let Err(e) = self.persist().await {
            // Not durable, so not created.
            self.users.remove_if(&username, |_, u| u.id == Some(id));
            return Err(e);
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::join_all;

    use super::*;
    use crate::types::{Fingerprint, test_keys};

    fn user(name: &str) -> User {
        let key = test_keys::ed25519();
        User::first_contact(name, Fingerprint::of(key.public_key()))
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let store = MemoryIdentityStore::new();
        let id = store.create(user("alice")).await.unwrap();

        let found = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert_eq!(found.username, "alice");
    }

    #[tokio::test]
    async fn test_find_missing_is_none() {
        let store = MemoryIdentityStore::new();
        assert!(store.find_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_create_is_rejected() {
        let store = MemoryIdentityStore::new();
        store.create(user("alice")).await.unwrap();

        let err = store.create(user("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(name) if name == "alice"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_have_one_winner() {
        let store = Arc::new(MemoryIdentityStore::new());

        let attempts = (0..32).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.create(user("race")).await })
        });
        let results = join_all(attempts).await;

        let winners = results
            .into_iter()
            .map(|joined| joined.expect("task panicked"))
            .filter(Result::is_ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let store = MemoryIdentityStore::open(dir.path()).await.unwrap();
        let id = store.create(user("alice")).await.unwrap();
        drop(store);

        let reopened = MemoryIdentityStore::open(dir.path()).await.unwrap();
        let found = reopened.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, Some(id));
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_no_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryIdentityStore::open(dir.path()).await.unwrap();
        // A directory where the snapshot file should be makes every write fail.
        std::fs::create_dir(dir.path().join(SYSTEM_SNAPSHOT)).unwrap();

        let result = store.create(user("alice")).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(store.find_by_username("alice").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SYSTEM_SNAPSHOT), b"not json").unwrap();

        let result = MemoryIdentityStore::open(dir.path()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
