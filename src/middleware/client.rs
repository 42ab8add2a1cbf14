//! Client-version gate.

use async_trait::async_trait;
use tracing::warn;

use super::{Middleware, Next, Session};

/// Rejects sessions whose SSH identification string is not allow-listed.
///
/// Generic SSH clients cannot speak the command protocol, so they never get
/// past this link.
pub struct ClientGate {
    allowed: Vec<String>,
}

impl ClientGate {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn allows(&self, client_version: &str) -> bool {
        self.allowed.iter().any(|a| a == client_version)
    }
}

#[async_trait]
impl Middleware for ClientGate {
    async fn handle(&self, session: &mut Session, next: Next<'_>) {
        if !self.allows(session.client_version()) {
            warn!(
                session = %session.id(),
                username = %session.username(),
                client_version = %session.client_version(),
                "Rejected unsupported client"
            );
            let message = format!(
                "unsupported client '{}', use the syringe client",
                session.client_version()
            );
            session.reject("client", message);
            return;
        }

        next.run(session).await;
    }

    fn name(&self) -> &'static str {
        "client-gate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CLIENT_BANNER;
    use crate::middleware::Pipeline;
    use crate::middleware::testing::Spy;
    use crate::types::test_keys;

    fn session_from(client_version: &str) -> Session {
        let key = test_keys::ed25519();
        Session::new("alice", client_version, key.public_key().clone(), "project list")
    }

    #[tokio::test]
    async fn test_foreign_clients_never_reach_downstream() {
        for version in [
            "SSH-2.0-OpenSSH_9.6",
            "SSH-2.0-PuTTY_Release_0.80",
            "SSH-2.0-Syringe_2",
            "SSH-2.0-syringe",
            "",
        ] {
            let spy = Spy::default();
            let pipeline = Pipeline::new()
                .with(ClientGate::new(vec![CLIENT_BANNER.to_string()]))
                .with(spy.clone());

            let mut session = session_from(version);
            pipeline.run(&mut session).await;

            assert_eq!(spy.calls(), 0, "downstream reached for {:?}", version);
            assert_eq!(session.exit_status(), Some(1));
            let stderr = String::from_utf8(session.stderr().to_vec()).unwrap();
            assert!(stderr.starts_with("error: client: unsupported client"));
        }
    }

    #[tokio::test]
    async fn test_allowed_client_passes_through() {
        let spy = Spy::default();
        let pipeline = Pipeline::new()
            .with(ClientGate::new(vec![CLIENT_BANNER.to_string()]))
            .with(spy.clone());

        let mut session = session_from(CLIENT_BANNER);
        pipeline.run(&mut session).await;

        assert_eq!(spy.calls(), 1);
        assert_eq!(session.exit_status(), Some(0));
        assert!(session.stderr().is_empty());
    }
}
