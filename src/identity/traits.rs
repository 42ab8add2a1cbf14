//! Identity store trait definition.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{User, UserId};

/// Trait for the system identity store.
///
/// Implementations must be thread-safe (`Send + Sync`): every connection
/// task consults the same store concurrently.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up a user by the username asserted at connection time.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Create a user and return its assigned ID.
    ///
    /// Must be an atomic insert-if-absent: of any number of concurrent calls
    /// for the same username exactly one succeeds, the others fail with
    /// [`StoreError::AlreadyExists`].
    async fn create(&self, user: User) -> Result<UserId, StoreError>;
}
