//! Per-tenant database handle.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ServiceError;
use crate::types::UserId;

/// Secrets of one environment, keyed by secret name. Values are ciphertext.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct EnvironmentData {
    pub(crate) secrets: BTreeMap<String, String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct ProjectData {
    pub(crate) environments: BTreeMap<String, EnvironmentData>,
}

/// Everything a single tenant owns.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct TenantData {
    pub(crate) projects: BTreeMap<String, ProjectData>,
}

/// Handle to one tenant's isolated data partition.
///
/// Handles are created by a [`TenantRouter`](super::TenantRouter) and shared
/// through `Arc`; all access is serialized by an async `RwLock`.
#[derive(Debug)]
pub struct TenantDatabase {
    owner: UserId,
    data: RwLock<TenantData>,
    snapshot: Option<PathBuf>,
}

impl TenantDatabase {
    /// Create an empty, memory-only tenant database.
    pub fn in_memory(owner: UserId) -> Self {
        Self {
            owner,
            data: RwLock::new(TenantData::default()),
            snapshot: None,
        }
    }

    /// Open the tenant database stored at `path`, creating it empty if absent.
    pub(crate) async fn open(owner: UserId, path: PathBuf) -> Result<Self, std::io::Error> {
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TenantData::default(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            owner,
            data: RwLock::new(data),
            snapshot: Some(path),
        })
    }

    /// The user this partition belongs to.
    pub fn owner(&self) -> UserId {
        self.owner
    }

    /// Run a read-only query against the tenant data.
    pub(crate) async fn view<T>(&self, query: impl FnOnce(&TenantData) -> T) -> T {
        let data = self.data.read().await;
        query(&data)
    }

    /// Apply a mutation and persist the result when backed by a file.
    ///
    /// The change is made on a copy that replaces the live data only once the
    /// snapshot is written, so a failed mutation or a failed write leaves the
    /// tenant untouched. The write lock is held throughout, so snapshots are
    /// always taken in mutation order.
    pub(crate) async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut TenantData) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut data = self.data.write().await;
        let mut next = data.clone();
        let result = change(&mut next)?;

        if let Some(path) = &self.snapshot {
            let bytes = serde_json::to_vec_pretty(&next)
                .map_err(|e| ServiceError::Persist(e.to_string()))?;
            tokio::fs::write(path, bytes)
                .await
                .map_err(|e| ServiceError::Persist(format!("{:?}: {}", path, e)))?;
            debug!(tenant = %self.owner, "Persisted tenant snapshot");
        }

        *data = next;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_project(data: &mut TenantData, name: &str) -> Result<(), ServiceError> {
        data.projects.insert(name.to_string(), ProjectData::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_mutation_is_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenant.json");
        let owner = UserId::new();

        let db = TenantDatabase::open(owner, path.clone()).await.unwrap();
        db.mutate(|data| add_project(data, "web")).await.unwrap();
        drop(db);

        let reopened = TenantDatabase::open(owner, path).await.unwrap();
        assert!(reopened.view(|data| data.projects.contains_key("web")).await);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenant.json");
        let db = TenantDatabase::open(UserId::new(), path.clone()).await.unwrap();
        db.mutate(|data| add_project(data, "web")).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let result = db.mutate(|data| add_project(data, "api")).await;
        assert!(matches!(result, Err(ServiceError::Persist(_))));
        let names: Vec<String> = db.view(|data| data.projects.keys().cloned().collect()).await;
        assert_eq!(names, vec!["web".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_change_is_discarded() {
        let db = TenantDatabase::in_memory(UserId::new());

        let result: Result<(), ServiceError> = db
            .mutate(|data| {
                add_project(data, "half")?;
                Err(ServiceError::Persist("refused".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(db.view(|data| data.projects.is_empty()).await);
    }
}
