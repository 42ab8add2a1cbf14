use async_trait::async_trait;
use tracing::debug;

use crate::command::parse;

use super::{Middleware, Next, Session};

/// Parses the session's command and validates the resulting request,
/// reporting failures in one uniform shape.
pub struct Validation;

#[async_trait]
impl Middleware for Validation {
    async fn handle(&self, session: &mut Session, next: Next<'_>) {
        let request = match parse(session.command()) {
            Ok(request) => request,
            Err(e) => {
                debug!(session = %session.id(), "Unparseable command: {}", e);
                session.reject("command", e.to_string());
                return;
            }
        };

        if let Err(e) = request.validate() {
            debug!(session = %session.id(), verb = request.verb(), "Invalid request: {}", e);
            session.reject("validation", format!("invalid {} request", request.verb()));
            for field in &e.fields {
                session.eprintln(format!("  {}", field));
            }
            return;
        }

        session.request = Some(request);
        next.run(session).await;
    }

    fn name(&self) -> &'static str {
        "validation"
    }
}
