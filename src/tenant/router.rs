//! Tenant router trait and its DashMap-backed implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::RouterError;
use crate::types::UserId;

use super::database::TenantDatabase;

/// Resolves a server-authenticated user to that user's tenant database.
///
/// `resolve` is idempotent: repeated calls for one user return the same
/// handle, and distinct users never share one.
#[async_trait]
pub trait TenantRouter: Send + Sync {
    async fn resolve(&self, user_id: UserId) -> Result<Arc<TenantDatabase>, RouterError>;
}

/// Cache-or-open router keyed by user ID.
///
/// Without a data directory tenants live in memory. With one, each tenant
/// is opened from `<data_dir>/tenants/<user-id>.json` on first resolve.
pub struct MemoryTenantRouter {
    handles: DashMap<UserId, Arc<TenantDatabase>>,
    data_dir: Option<PathBuf>,
    // Held while opening a file-backed tenant so a handle is opened once.
    open_lock: Mutex<()>,
}

impl MemoryTenantRouter {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            data_dir: None,
            open_lock: Mutex::new(()),
        }
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            handles: DashMap::new(),
            data_dir: Some(data_dir.into()),
            open_lock: Mutex::new(()),
        }
    }

    /// Number of tenants opened so far.
    pub fn open_tenants(&self) -> usize {
        self.handles.len()
    }

    async fn open(&self, user_id: UserId, dir: &Path) -> Result<Arc<TenantDatabase>, RouterError> {
        let _guard = self.open_lock.lock().await;

        if let Some(handle) = self.handles.get(&user_id) {
            return Ok(handle.clone());
        }

        let unavailable = |reason: String| RouterError::Unavailable {
            user_id: user_id.to_string(),
            reason,
        };

        let tenants_dir = dir.join("tenants");
        tokio::fs::create_dir_all(&tenants_dir)
            .await
            .map_err(|e| unavailable(format!("{:?}: {}", tenants_dir, e)))?;

        let path = tenants_dir.join(format!("{}.json", user_id));
        let database = TenantDatabase::open(user_id, path.clone())
            .await
            .map_err(|e| unavailable(format!("{:?}: {}", path, e)))?;

        info!(tenant = %user_id, "Opened tenant database {:?}", path);
        let handle = Arc::new(database);
        self.handles.insert(user_id, handle.clone());
        Ok(handle)
    }
}

impl Default for MemoryTenantRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TenantRouter for MemoryTenantRouter {
    async fn resolve(&self, user_id: UserId) -> Result<Arc<TenantDatabase>, RouterError> {
        if let Some(handle) = self.handles.get(&user_id) {
            return Ok(handle.clone());
        }

        match &self.data_dir {
            Some(dir) => self.open(user_id, dir).await,
            None => Ok(self
                .handles
                .entry(user_id)
                .or_insert_with(|| Arc::new(TenantDatabase::in_memory(user_id)))
                .clone()),
        }
    }
}
