//! Multi-tenant routing.
//!
//! Every authenticated user owns an isolated [`TenantDatabase`]. A session
//! starts [`TenantState::Unresolved`] and is bound exactly once, right after
//! identity provisioning, to the handle the [`TenantRouter`] returns for the
//! server-resolved user. Nothing a client sends can select a tenant.

mod database;
mod router;

use std::sync::Arc;

pub use database::TenantDatabase;
pub(crate) use database::{EnvironmentData, ProjectData, TenantData};
pub use router::{MemoryTenantRouter, TenantRouter};

use crate::error::RouterError;

/// Per-session tenant binding.
#[derive(Debug, Default)]
pub enum TenantState {
    #[default]
    Unresolved,
    Resolved(Arc<TenantDatabase>),
}

impl TenantState {
    /// Bind the session to `handle`. A session can be bound only once.
    pub fn bind(&mut self, handle: Arc<TenantDatabase>) -> Result<(), RouterError> {
        if let TenantState::Resolved(existing) = self {
            return Err(RouterError::AlreadyResolved(existing.owner().to_string()));
        }
        *self = TenantState::Resolved(handle);
        Ok(())
    }

    pub fn handle(&self) -> Option<&Arc<TenantDatabase>> {
        match self {
            TenantState::Resolved(handle) => Some(handle),
            TenantState::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, TenantState::Resolved(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    #[test]
    fn test_starts_unresolved() {
        let state = TenantState::default();
        assert!(!state.is_resolved());
        assert!(state.handle().is_none());
    }

    #[test]
    fn test_binds_once() {
        let owner = UserId::new();
        let mut state = TenantState::default();
        state
            .bind(Arc::new(TenantDatabase::in_memory(owner)))
            .unwrap();
        assert!(state.is_resolved());
        assert_eq!(state.handle().unwrap().owner(), owner);

        let again = state.bind(Arc::new(TenantDatabase::in_memory(UserId::new())));
        assert!(matches!(again, Err(RouterError::AlreadyResolved(_))));
        assert_eq!(state.handle().unwrap().owner(), owner);
    }
}
