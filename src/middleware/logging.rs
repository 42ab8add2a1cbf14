use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use super::{Middleware, Next, Session};

/// Records session start and finish. Pure observation.
pub struct Logging;

#[async_trait]
impl Middleware for Logging {
    async fn handle(&self, session: &mut Session, next: Next<'_>) {
        let start = Instant::now();
        info!(
            session = %session.id(),
            username = %session.username(),
            client_version = %session.client_version(),
            command = %session.command(),
            "Session started"
        );

        next.run(session).await;

        info!(
            session = %session.id(),
            username = %session.username(),
            fingerprint = session.fingerprint.as_ref().map(|f| f.as_str()).unwrap_or("-"),
            verb = session.request.as_ref().map(|r| r.verb()).unwrap_or("-"),
            exit_status = session.exit_status().unwrap_or(0),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Session finished"
        );
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
