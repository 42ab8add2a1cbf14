//! Session middleware pipeline.
//!
//! A [`Pipeline`] is an explicit ordered list of [`Middleware`] objects. Each
//! link receives the session and a [`Next`] handle for the rest of the chain;
//! it may act before and after calling `next.run(session)`, or refuse to call
//! it at all. The driver never invokes a further link once a session has an
//! exit status, so a rejection always stops the chain.
//!
//! The standard order, outermost first:
//!
//! 1. [`ClientGate`] rejects clients outside the banner allow-list
//! 2. [`Logging`] records session start and finish
//! 3. [`IdentityProvisioner`] registers first contacts, verifies the key and
//!    binds the tenant
//! 4. [`Validation`] parses and validates the command
//! 5. [`Dispatch`] runs the request against the tenant's services

mod client;
mod dispatch;
mod identity;
mod logging;
mod session;
mod validation;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ServerConfig;
use crate::identity::IdentityStore;
use crate::tenant::TenantRouter;

pub use client::ClientGate;
pub use dispatch::Dispatch;
pub use identity::IdentityProvisioner;
pub use logging::Logging;
pub use session::Session;
pub use validation::Validation;

/// One link of the session pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Handle the session, calling `next.run(session)` to continue the chain.
    async fn handle(&self, session: &mut Session, next: Next<'_>);

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// The remainder of the chain after the current link.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
}

impl Next<'_> {
    /// Invoke the next link, unless the session has already finished.
    pub async fn run(self, session: &mut Session) {
        if let Some(status) = session.exit_status() {
            debug!(
                session = %session.id(),
                exit_status = status,
                "Session finished, chain stops"
            );
            return;
        }

        if let Some((link, rest)) = self.rest.split_first() {
            link.handle(session, Next { rest }).await;
        }
    }
}

/// Ordered middleware chain driven once per session.
#[derive(Clone, Default)]
pub struct Pipeline {
    links: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a link; links run in the order they are added.
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.links.push(Arc::new(middleware));
        self
    }

    /// The server's standard chain.
    pub fn standard(
        config: &ServerConfig,
        store: Arc<dyn IdentityStore>,
        router: Arc<dyn TenantRouter>,
    ) -> Self {
        Self::new()
            .with(ClientGate::new(config.allowed_clients.clone()))
            .with(Logging)
            .with(IdentityProvisioner::new(store.clone(), router))
            .with(Validation)
            .with(Dispatch::new(store))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.links.iter().map(|link| link.name()).collect()
    }

    /// Drive the session through the chain. A session nobody exited
    /// finishes with status 0.
    pub async fn run(&self, session: &mut Session) {
        Next { rest: &self.links }.run(session).await;
        session.exit(0);
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::testing::{Spy, Trace, session};
    use super::*;
    use crate::identity::MemoryIdentityStore;
    use crate::tenant::MemoryTenantRouter;

    struct Reject;

    #[async_trait]
    impl Middleware for Reject {
        async fn handle(&self, session: &mut Session, next: Next<'_>) {
            session.reject("test", "nope");
            // A link that forgets to return still cannot reach downstream.
            next.run(session).await;
        }

        fn name(&self) -> &'static str {
            "reject"
        }
    }

    #[tokio::test]
    async fn test_links_run_outer_to_inner_and_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .with(Trace {
                label: "outer",
                log: log.clone(),
            })
            .with(Trace {
                label: "inner",
                log: log.clone(),
            });

        let mut s = session("alice", "project list");
        pipeline.run(&mut s).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["enter outer", "enter inner", "leave inner", "leave outer"]
        );
        assert_eq!(s.exit_status(), Some(0));
    }

    #[tokio::test]
    async fn test_rejection_stops_the_chain() {
        let spy = Spy::default();
        let pipeline = Pipeline::new().with(Reject).with(spy.clone());

        let mut s = session("alice", "project list");
        pipeline.run(&mut s).await;

        assert_eq!(spy.calls(), 0);
        assert_eq!(s.exit_status(), Some(1));
    }

    #[test]
    fn test_standard_order() {
        let config = {
            let _guard = crate::config::test_env::ENV_TEST_MUTEX.lock().unwrap();
            ServerConfig::from_env()
        };
        let pipeline = Pipeline::standard(
            &config,
            Arc::new(MemoryIdentityStore::new()),
            Arc::new(MemoryTenantRouter::new()),
        );
        assert_eq!(
            pipeline.names(),
            vec!["client-gate", "logging", "identity", "validation", "dispatch"]
        );
    }
}
