//! Base handler: runs the validated request against the session's tenant.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::command::Request;
use crate::error::ServiceError;
use crate::identity::IdentityStore;
use crate::services::{EnvironmentService, ProjectService, SecretService};
use crate::tenant::TenantDatabase;

use super::identity::{Registration, register};
use super::{Middleware, Next, Session};

/// Innermost link. Routes through the tenant handle bound by identity
/// provisioning, never through anything the client sent.
pub struct Dispatch {
    store: Arc<dyn IdentityStore>,
}

impl Dispatch {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    async fn register(&self, session: &mut Session) {
        let Some(fingerprint) = session.fingerprint.clone() else {
            session.reject("register", "no public key fingerprint");
            return;
        };
        let username = session.username().to_string();

        match register(self.store.as_ref(), &username, &fingerprint).await {
            Ok(Registration::Created(_)) => {
                info!(session = %session.id(), username = %username, fingerprint = %fingerprint, "Registered user");
                session.println(format!("Registered '{}' with key {}", username, fingerprint));
                session.exit(0);
            }
            Ok(Registration::Existing(user)) if user.public_key_fingerprint == fingerprint => {
                session.println(format!("Key {} is already registered for '{}'", fingerprint, username));
                session.exit(0);
            }
            Ok(Registration::Existing(_)) => {
                session.reject(
                    "register",
                    format!("username '{}' is registered with a different key", username),
                );
            }
            Err(e) => {
                error!(session = %session.id(), username = %username, "Registration failed: {}", e);
                session.reject("register", format!("failed to register '{}'", username));
            }
        }
    }
}

/// Scope used when reporting a failed request.
fn scope(request: &Request) -> &'static str {
    match request {
        Request::Register => "register",
        Request::AddProject(_)
        | Request::RemoveProject(_)
        | Request::RenameProject(_)
        | Request::ListProjects => "project",
        Request::AddEnvironment(_)
        | Request::RemoveEnvironment(_)
        | Request::RenameEnvironment(_)
        | Request::ListEnvironments(_) => "environment",
        Request::SetSecret(_)
        | Request::GetSecret(_)
        | Request::RemoveSecret(_)
        | Request::ListSecrets(_)
        | Request::Inject(_) => "secret",
    }
}

fn key_value_lines(pairs: Vec<(String, String)>) -> Vec<String> {
    pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect()
}

/// Run `request` against `db`, returning the output lines.
async fn execute(db: &TenantDatabase, request: &Request) -> Result<Vec<String>, ServiceError> {
    let projects = ProjectService::new(db);
    let environments = EnvironmentService::new(db);
    let secrets = SecretService::new(db);

    let lines = match request {
        // Handled against the identity store, never reaches a tenant.
        Request::Register => Vec::new(),

        Request::AddProject(r) => {
            projects.add(r).await?;
            vec![format!("Project '{}' added", r.name)]
        }
        Request::RemoveProject(r) => {
            projects.remove(r).await?;
            vec![format!("Project '{}' removed", r.name)]
        }
        Request::RenameProject(r) => {
            projects.rename(r).await?;
            vec![format!("Project '{}' renamed to '{}'", r.name, r.new_name)]
        }
        Request::ListProjects => projects.list().await,

        Request::AddEnvironment(r) => {
            environments.add(r).await?;
            vec![format!("Environment '{}' added to '{}'", r.name, r.project_name)]
        }
        Request::RemoveEnvironment(r) => {
            environments.remove(r).await?;
            vec![format!("Environment '{}' removed from '{}'", r.name, r.project_name)]
        }
        Request::RenameEnvironment(r) => {
            environments.rename(r).await?;
            vec![format!("Environment '{}' renamed to '{}'", r.name, r.new_name)]
        }
        Request::ListEnvironments(r) => environments.list(r).await?,

        Request::SetSecret(r) => {
            secrets.set(r).await?;
            vec![format!("Secret '{}' set in {}/{}", r.key, r.project, r.environment)]
        }
        Request::GetSecret(r) => vec![secrets.get(r).await?],
        Request::RemoveSecret(r) => {
            secrets.remove(r).await?;
            vec![format!("Secret '{}' removed from {}/{}", r.key, r.project, r.environment)]
        }
        Request::ListSecrets(r) => key_value_lines(secrets.list(r).await?),
        Request::Inject(r) => key_value_lines(secrets.inject(r).await?),
    };

    Ok(lines)
}

#[async_trait]
impl Middleware for Dispatch {
    async fn handle(&self, session: &mut Session, _next: Next<'_>) {
        let Some(request) = session.request.clone() else {
            session.reject("command", "no command to dispatch");
            return;
        };

        if request == Request::Register {
            self.register(session).await;
            return;
        }

        let Some(db) = session.tenant.handle().cloned() else {
            session.reject("tenant", "session is not bound to a tenant");
            return;
        };

        match execute(&db, &request).await {
            Ok(lines) => {
                for line in lines {
                    session.println(line);
                }
                session.exit(0);
            }
            Err(e) => {
                if let ServiceError::Persist(_) = e {
                    error!(session = %session.id(), tenant = %db.owner(), "Tenant write failed: {}", e);
                }
                session.reject(scope(&request), e.to_string());
            }
        }
    }

    fn name(&self) -> &'static str {
        "dispatch"
    }
}
