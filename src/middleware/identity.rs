//! Identity provisioning: first-contact registration, public key
//! verification and tenant binding.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::identity::IdentityStore;
use crate::tenant::TenantRouter;
use crate::types::{Fingerprint, User};

use super::{Middleware, Next, Session};

/// Outcome of an insert-if-absent registration.
#[derive(Debug)]
pub(crate) enum Registration {
    Created(User),
    Existing(User),
}

/// Create `username` with `fingerprint` unless it exists. A lost creation
/// race resolves to the winner's record.
pub(crate) async fn register(
    store: &dyn IdentityStore,
    username: &str,
    fingerprint: &Fingerprint,
) -> Result<Registration, StoreError> {
    let mut user = User::first_contact(username, fingerprint.clone());
    match store.create(user.clone()).await {
        Ok(id) => {
            user.id = Some(id);
            Ok(Registration::Created(user))
        }
        Err(StoreError::AlreadyExists(_)) => {
            debug!(username = %username, "Lost creation race, re-reading user");
            store
                .find_by_username(username)
                .await?
                .map(Registration::Existing)
                .ok_or_else(|| StoreError::Unavailable(format!("user '{}' vanished", username)))
        }
        Err(e) => Err(e),
    }
}

/// Turns a connection's username and key into a verified user bound to
/// its tenant database.
pub struct IdentityProvisioner {
    store: Arc<dyn IdentityStore>,
    router: Arc<dyn TenantRouter>,
}

impl IdentityProvisioner {
    pub fn new(store: Arc<dyn IdentityStore>, router: Arc<dyn TenantRouter>) -> Self {
        Self { store, router }
    }

    /// Find the session's user, creating it on first contact. Rejects the
    /// session and returns `None` on failure.
    async fn lookup_or_create(&self, session: &mut Session, fingerprint: &Fingerprint) -> Option<User> {
        let username = session.username().to_string();

        match self.store.find_by_username(&username).await {
            Ok(Some(user)) => return Some(user),
            Ok(None) => {}
            Err(e) => {
                error!(session = %session.id(), username = %username, "Identity lookup failed: {}", e);
                session.reject("user", format!("failed to look up user '{}'", username));
                return None;
            }
        }

        match register(self.store.as_ref(), &username, fingerprint).await {
            Ok(Registration::Created(user)) => {
                info!(
                    session = %session.id(),
                    username = %username,
                    fingerprint = %fingerprint,
                    "Created user on first contact"
                );
                session.eprintln(format!("Created user '{}'", username));
                Some(user)
            }
            Ok(Registration::Existing(user)) => Some(user),
            Err(e) => {
                error!(session = %session.id(), username = %username, "User creation failed: {}", e);
                session.reject("user", format!("failed to create user '{}'", username));
                None
            }
        }
    }
}

#[async_trait]
impl Middleware for IdentityProvisioner {
    async fn handle(&self, session: &mut Session, next: Next<'_>) {
        let fingerprint = Fingerprint::of(session.public_key());
        session.fingerprint = Some(fingerprint.clone());

        if session.command().trim() == "register" {
            next.run(session).await;
            return;
        }

        let Some(user) = self.lookup_or_create(session, &fingerprint).await else {
            return;
        };

        if user.public_key_fingerprint != fingerprint {
            warn!(
                session = %session.id(),
                username = %user.username,
                fingerprint = %fingerprint,
                "Public key does not match registered key"
            );
            let message = format!(
                "public key does not match the key registered for '{}'",
                user.username
            );
            session.reject("auth", message);
            return;
        }

        let Some(user_id) = user.id else {
            session.reject("user", format!("user '{}' has no id", user.username));
            return;
        };

        let handle = match self.router.resolve(user_id).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(session = %session.id(), tenant = %user_id, "Tenant resolution failed: {}", e);
                session.reject("tenant", "tenant database unavailable");
                return;
            }
        };
        if let Err(e) = session.tenant.bind(handle) {
            session.reject("tenant", e.to_string());
            return;
        }

        debug!(session = %session.id(), tenant = %user_id, "Session bound to tenant");
        session.user = Some(user);
        next.run(session).await;
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

#[cfg(test)]
mod tests {
    use futures::future::join_all;

    use super::*;
    use crate::error::RouterError;
    use crate::identity::MemoryIdentityStore;
    use crate::middleware::Pipeline;
    use crate::middleware::testing::{Spy, session};
    use crate::tenant::{MemoryTenantRouter, TenantDatabase};
    use crate::types::{UserId, test_keys};

    struct DownRouter;

    #[async_trait]
    impl TenantRouter for DownRouter {
        async fn resolve(&self, user_id: UserId) -> Result<Arc<TenantDatabase>, RouterError> {
            Err(RouterError::Unavailable {
                user_id: user_id.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn pipeline(
        store: Arc<MemoryIdentityStore>,
        router: Arc<dyn TenantRouter>,
        spy: &Spy,
    ) -> Pipeline {
        Pipeline::new()
            .with(IdentityProvisioner::new(store, router))
            .with(spy.clone())
    }

    #[tokio::test]
    async fn test_first_contact_creates_user_and_binds_tenant() {
        let store = Arc::new(MemoryIdentityStore::new());
        let spy = Spy::default();
        let pipeline = pipeline(store.clone(), Arc::new(MemoryTenantRouter::new()), &spy);

        let mut s = session("alice", "project list");
        pipeline.run(&mut s).await;

        assert_eq!(spy.calls(), 1);
        assert_eq!(s.exit_status(), Some(0));
        assert_eq!(store.len(), 1);
        let user = s.user.as_ref().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(Some(&user.public_key_fingerprint), s.fingerprint.as_ref());
        assert_eq!(s.tenant.handle().unwrap().owner(), user.id.unwrap());

        let stderr = String::from_utf8(s.stderr().to_vec()).unwrap();
        assert_eq!(stderr, "Created user 'alice'\n");
        assert!(s.stdout().is_empty());
    }

    #[tokio::test]
    async fn test_returning_user_with_same_key_is_accepted() {
        let store = Arc::new(MemoryIdentityStore::new());
        let spy = Spy::default();
        let pipeline = pipeline(store.clone(), Arc::new(MemoryTenantRouter::new()), &spy);
        let key = test_keys::ed25519();

        for _ in 0..2 {
            let mut s = Session::new(
                "alice",
                crate::config::CLIENT_BANNER,
                key.public_key().clone(),
                "project list",
            );
            pipeline.run(&mut s).await;
            assert_eq!(s.exit_status(), Some(0));
        }
        assert_eq!(spy.calls(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_rejects_without_dispatch() {
        let store = Arc::new(MemoryIdentityStore::new());
        let spy = Spy::default();
        let pipeline = pipeline(store.clone(), Arc::new(MemoryTenantRouter::new()), &spy);

        let mut first = session("alice", "project list");
        pipeline.run(&mut first).await;
        assert_eq!(spy.calls(), 1);

        // Same username, different key.
        let mut intruder = session("alice", "project list");
        pipeline.run(&mut intruder).await;

        assert_eq!(spy.calls(), 1);
        assert_eq!(intruder.exit_status(), Some(1));
        assert!(intruder.user.is_none());
        assert!(!intruder.tenant.is_resolved());
        let stderr = String::from_utf8(intruder.stderr().to_vec()).unwrap();
        assert!(stderr.starts_with("error: auth: public key does not match"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_contacts_create_one_user() {
        let store = Arc::new(MemoryIdentityStore::new());
        let spy = Spy::default();
        let pipeline = Arc::new(pipeline(
            store.clone(),
            Arc::new(MemoryTenantRouter::new()),
            &spy,
        ));

        let results = join_all((0..16).map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                // Every contender presents its own key.
                let mut s = session("alice", "project list");
                pipeline.run(&mut s).await;
                s.exit_status()
            })
        }))
        .await;

        let statuses: Vec<_> = results
            .into_iter()
            .map(|joined| joined.expect("task panicked"))
            .collect();
        assert_eq!(store.len(), 1);
        assert_eq!(statuses.iter().filter(|s| **s == Some(0)).count(), 1);
        assert_eq!(spy.calls(), 1);
    }

    #[tokio::test]
    async fn test_register_skips_provisioning() {
        let store = Arc::new(MemoryIdentityStore::new());
        let spy = Spy::default();
        let pipeline = pipeline(store.clone(), Arc::new(MemoryTenantRouter::new()), &spy);

        let mut s = session("alice", "register");
        pipeline.run(&mut s).await;

        assert_eq!(spy.calls(), 1);
        assert!(store.is_empty());
        assert!(s.fingerprint.is_some());
        assert!(s.user.is_none());
        assert!(!s.tenant.is_resolved());
    }

    #[tokio::test]
    async fn test_unavailable_tenant_is_fatal() {
        let store = Arc::new(MemoryIdentityStore::new());
        let spy = Spy::default();
        let pipeline = pipeline(store, Arc::new(DownRouter), &spy);

        let mut s = session("alice", "project list");
        pipeline.run(&mut s).await;

        assert_eq!(spy.calls(), 0);
        assert_eq!(s.exit_status(), Some(1));
        let stderr = String::from_utf8(s.stderr().to_vec()).unwrap();
        assert!(stderr.contains("error: tenant: tenant database unavailable"));
    }

    #[tokio::test]
    async fn test_register_helper_reports_existing() {
        let store = MemoryIdentityStore::new();
        let key = test_keys::ed25519();
        let fp = Fingerprint::of(key.public_key());

        let first = register(&store, "alice", &fp).await.unwrap();
        let second = register(&store, "alice", &fp).await.unwrap();

        assert!(matches!(first, Registration::Created(_)));
        match second {
            Registration::Existing(user) => assert_eq!(user.public_key_fingerprint, fp),
            other => panic!("expected existing user, got {:?}", other),
        }
    }
}
